//! Backup coordinator configuration.
//!
//! Code defaults are layered under an optional TOML file and `BACKUP__*`
//! environment variables; each section validates itself.
mod gc;
mod lifecycle;
mod monitoring;
mod snapshot;
mod store;
pub use gc::*;
pub use lifecycle::*;
pub use monitoring::*;
pub use snapshot::*;
pub use store::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `BACKUP__GC__MAX_BACKUPS=3`
pub(crate) const ENV_PREFIX: &str = "BACKUP";

/// Root configuration of one coordinator run. Built once at startup and never
/// mutated afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BackupConfig {
    /// Full/delta snapshot scheduling
    #[serde(default)]
    pub snapshotter: SnapshotterConfig,
    /// Retention policy and garbage collection period
    #[serde(default)]
    pub gc: GcConfig,
    /// Snapshot store backend selection
    #[serde(default)]
    pub store: SnapstoreConfig,
    /// Abort handshake and trigger timeouts
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl BackupConfig {
    /// Merges defaults, the file named by `CONFIG_PATH` (if set) and `BACKUP__`
    /// environment variables, later sources winning.
    ///
    /// Not validated: apply `with_override_config()` first if needed, then call
    /// `validate()`.
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("BACKUP__SNAPSHOTTER__DELTA_SNAPSHOT_PERIOD_MS", "5000");
    /// let cfg = BackupConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layers `path` on top of `self`; environment variables still take
    /// precedence. Not validated.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` from the first failing section:
    /// - Unparsable cron schedule
    /// - Zero periods or limits
    /// - Retention policy without a bound
    /// - Privileged or zero metrics port
    pub fn validate(self) -> Result<Self> {
        self.snapshotter.validate()?;
        self.gc.validate()?;
        self.store.validate()?;
        self.lifecycle.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
