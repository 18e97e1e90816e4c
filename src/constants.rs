// -
// Snapshot naming layout

/// Directory prefix grouping one chain (a full snapshot and its deltas)
pub(crate) const CHAIN_DIR_PREFIX: &str = "Backup-";

/// Artifact name prefixes
pub(crate) const FULL_SNAPSHOT_PREFIX: &str = "Full";
pub(crate) const DELTA_SNAPSHOT_PREFIX: &str = "Incr";

/// Artifact name suffixes
pub(crate) const COMPRESSED_SUFFIX: &str = ".gz";
pub(crate) const FINAL_SUFFIX: &str = ".final";

/// Prefix for in-progress writes of the local snapshot store
pub(crate) const TEMP_FILE_PREFIX: &str = "temp-";

// -
// Retention

/// Number of GC cycles a final snapshot stays pinned
pub(crate) const FINAL_SNAPSHOT_PIN_CYCLES: u32 = 1;

/// Default delta snapshot memory limit (100 MiB)
pub(crate) const DEFAULT_DELTA_SNAPSHOT_MEMORY_LIMIT: usize = 100 * 1024 * 1024;

// -
// Monitoring

pub(crate) const DEFAULT_METRICS_PORT: u16 = 9095;

/// Lowest port an unprivileged process may bind
pub(crate) const FIRST_UNPRIVILEGED_PORT: u16 = 1024;
