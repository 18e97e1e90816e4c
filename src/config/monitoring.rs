use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::constants::DEFAULT_METRICS_PORT;
use crate::constants::FIRST_UNPRIVILEGED_PORT;
use crate::Error;
use crate::Result;

/// Prometheus `/metrics` endpoint served next to the snapshot lifecycle.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub prometheus_port: u16,

    /// Interface the metrics server binds to
    #[serde(default = "default_bind_address")]
    pub prometheus_bind_address: IpAddr,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_port: default_metrics_port(),
            prometheus_bind_address: default_bind_address(),
        }
    }
}

impl MonitoringConfig {
    /// Where the metrics server listens, `None` when it is disabled.
    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.prometheus_enabled
            .then(|| SocketAddr::new(self.prometheus_bind_address, self.prometheus_port))
    }

    /// Rejects an enabled endpoint on port 0 or on a privileged port.
    pub fn validate(&self) -> Result<()> {
        if !self.prometheus_enabled {
            if self.prometheus_port != default_metrics_port() {
                warn!(
                    "prometheus_port {} is ignored while metrics are disabled",
                    self.prometheus_port
                );
            }
            return Ok(());
        }

        match self.prometheus_port {
            0 => Err(Error::InvalidConfig(
                "prometheus_port must be set when metrics are enabled".into(),
            )),
            port if port < FIRST_UNPRIVILEGED_PORT => Err(Error::InvalidConfig(format!(
                "prometheus_port {port} needs elevated privileges; use {FIRST_UNPRIVILEGED_PORT} or above"
            ))),
            _ => Ok(()),
        }
    }
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
