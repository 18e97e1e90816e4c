use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Timeouts applied by the coordinator's control surface.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LifecycleConfig {
    /// How long an abort request waits for the snapshot loop to acknowledge before
    /// forcing cancellation
    #[serde(default = "default_abort_ack_timeout_ms")]
    pub abort_ack_timeout_ms: u64,

    /// Deadline for an on-demand full snapshot
    #[serde(default = "default_trigger_timeout_ms")]
    pub trigger_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            abort_ack_timeout_ms: default_abort_ack_timeout_ms(),
            trigger_timeout_ms: default_trigger_timeout_ms(),
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.abort_ack_timeout_ms == 0 {
            return Err(Error::InvalidConfig("abort_ack_timeout_ms must be greater than 0".into()));
        }
        if self.trigger_timeout_ms == 0 {
            return Err(Error::InvalidConfig("trigger_timeout_ms must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn abort_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.abort_ack_timeout_ms)
    }

    pub fn trigger_timeout(&self) -> Duration {
        Duration::from_millis(self.trigger_timeout_ms)
    }
}

fn default_abort_ack_timeout_ms() -> u64 {
    60_000
}
fn default_trigger_timeout_ms() -> u64 {
    60_000
}
