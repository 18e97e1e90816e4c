use chrono::DateTime;
use chrono::Utc;

use super::Snapshot;
use super::SnapshotKind;
use crate::constants::CHAIN_DIR_PREFIX;
use crate::constants::COMPRESSED_SUFFIX;
use crate::constants::DELTA_SNAPSHOT_PREFIX;
use crate::constants::FINAL_SUFFIX;
use crate::constants::FULL_SNAPSHOT_PREFIX;
use crate::StorageError;

/// Centralized naming conventions for snapshot artifacts.
///
/// Keeps key construction and parsing in one place so that every backend stores
/// artifacts under the same recoverable layout.
impl Snapshot {
    /// Directory grouping this artifact's chain
    pub fn chain_dir(&self) -> String {
        chain_dir_name(self.chain_created_on)
    }

    /// Artifact file name inside the chain directory
    pub fn name(&self) -> String {
        let prefix = match self.kind {
            SnapshotKind::Full => FULL_SNAPSHOT_PREFIX,
            SnapshotKind::Delta => DELTA_SNAPSHOT_PREFIX,
        };
        let mut name = format!(
            "{}-{:08}-{:08}-{}",
            prefix,
            self.start_revision,
            self.last_revision,
            self.created_on.timestamp_millis()
        );
        if self.compressed {
            name.push_str(COMPRESSED_SUFFIX);
        }
        if self.is_final {
            name.push_str(FINAL_SUFFIX);
        }
        name
    }

    /// Store key: `<chain dir>/<name>`
    pub fn key(&self) -> String {
        format!("{}/{}", self.chain_dir(), self.name())
    }

    /// Recovers the snapshot metadata from its store key.
    pub fn from_key(key: &str) -> std::result::Result<Self, StorageError> {
        let invalid = || StorageError::InvalidSnapshotKey(key.to_string());

        let (dir, name) = key.rsplit_once('/').ok_or_else(invalid)?;
        // Tolerate backend prefixes in front of the chain directory
        let dir = dir.rsplit('/').next().ok_or_else(invalid)?;
        let chain_created_on = parse_chain_dir(dir).ok_or_else(invalid)?;

        let (name, is_final) = match name.strip_suffix(FINAL_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };
        let (name, compressed) = match name.strip_suffix(COMPRESSED_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };

        let parts: Vec<&str> = name.split('-').collect();
        if parts.len() != 4 {
            return Err(invalid());
        }
        let kind = match parts[0] {
            FULL_SNAPSHOT_PREFIX => SnapshotKind::Full,
            DELTA_SNAPSHOT_PREFIX => SnapshotKind::Delta,
            _ => return Err(invalid()),
        };
        let start_revision: u64 = parts[1].parse().map_err(|_| invalid())?;
        let last_revision: u64 = parts[2].parse().map_err(|_| invalid())?;
        let created_millis: i64 = parts[3].parse().map_err(|_| invalid())?;
        let created_on = DateTime::<Utc>::from_timestamp_millis(created_millis).ok_or_else(invalid)?;

        if start_revision > last_revision || (is_final && kind == SnapshotKind::Delta) {
            return Err(invalid());
        }
        if kind == SnapshotKind::Full && (start_revision != 0 || created_on != chain_created_on) {
            return Err(invalid());
        }

        Ok(Snapshot {
            kind,
            start_revision,
            last_revision,
            created_on,
            chain_created_on,
            compressed,
            is_final,
        })
    }
}

pub(crate) fn chain_dir_name(chain_created_on: DateTime<Utc>) -> String {
    format!("{}{}", CHAIN_DIR_PREFIX, chain_created_on.timestamp_millis())
}

/// Extracts the chain creation time from a chain directory name
pub(crate) fn parse_chain_dir(dir: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = dir.strip_prefix(CHAIN_DIR_PREFIX)?.parse().ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}
