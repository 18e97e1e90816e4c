use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPolicyKind {
    /// Keep the `max_backups` newest chains
    #[default]
    LimitBased,
    /// Keep chains younger than `max_backup_age_secs`
    AgeBased,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GcConfig {
    #[serde(default = "default_garbage_collection_period_ms")]
    pub garbage_collection_period_ms: u64,

    #[serde(default)]
    pub policy: GcPolicyKind,

    /// Chains retained by the limit based policy
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Maximum chain age retained by the age based policy
    #[serde(default = "default_max_backup_age_secs")]
    pub max_backup_age_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            garbage_collection_period_ms: default_garbage_collection_period_ms(),
            policy: GcPolicyKind::default(),
            max_backups: default_max_backups(),
            max_backup_age_secs: default_max_backup_age_secs(),
        }
    }
}

impl GcConfig {
    pub fn validate(&self) -> Result<()> {
        if self.garbage_collection_period_ms == 0 {
            return Err(Error::InvalidConfig(
                "garbage_collection_period_ms must be greater than 0".into(),
            ));
        }
        match self.policy {
            GcPolicyKind::LimitBased if self.max_backups == 0 => Err(Error::InvalidConfig(
                "max_backups must be at least 1 for the LimitBased policy".into(),
            )),
            GcPolicyKind::AgeBased if self.max_backup_age_secs == 0 => Err(Error::InvalidConfig(
                "max_backup_age_secs must be greater than 0 for the AgeBased policy".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.garbage_collection_period_ms)
    }

    pub fn max_backup_age(&self) -> Duration {
        Duration::from_secs(self.max_backup_age_secs)
    }
}

fn default_garbage_collection_period_ms() -> u64 {
    60_000
}
fn default_max_backups() -> usize {
    7
}
fn default_max_backup_age_secs() -> u64 {
    7 * 24 * 3600
}
