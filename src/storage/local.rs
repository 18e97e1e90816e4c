//! Filesystem-based snapshot storage.
//!
//! Stores artifacts as files, one directory per chain:
//! ```text
//! {base_dir}/
//!   Backup-{chain millis}/
//!     Full-00000000-00000030-{millis}
//!     Incr-00000031-00000042-{millis}
//! ```
//!
//! Writes go to a `temp-` file first and are renamed into place, so a crash never
//! leaves a partially written artifact under a listable name.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::SnapStore;
use crate::constants::TEMP_FILE_PREFIX;
use crate::snapshot::parse_chain_dir;
use crate::sort_snapshots;
use crate::Result;
use crate::Snapshot;
use crate::StorageError;

#[derive(Debug)]
pub struct LocalSnapStore {
    base_dir: PathBuf,
}

impl LocalSnapStore {
    /// Creates the base directory if it doesn't exist.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await.map_err(|e| path_error(&base_dir, e))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn chain_dir_path(
        &self,
        snapshot: &Snapshot,
    ) -> PathBuf {
        self.base_dir.join(snapshot.chain_dir())
    }

    fn final_path(
        &self,
        snapshot: &Snapshot,
    ) -> PathBuf {
        self.chain_dir_path(snapshot).join(snapshot.name())
    }

    fn temp_path(
        &self,
        snapshot: &Snapshot,
    ) -> PathBuf {
        self.chain_dir_path(snapshot)
            .join(format!("{}{}", TEMP_FILE_PREFIX, snapshot.name()))
    }

    async fn list_chain_dir(
        &self,
        dir_name: &str,
        out: &mut Vec<Snapshot>,
    ) -> Result<()> {
        let dir = self.base_dir.join(dir_name);
        let mut entries = fs::read_dir(&dir).await.map_err(|e| path_error(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| path_error(&dir, e))? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with(TEMP_FILE_PREFIX) {
                trace!("skipping in-progress write {}", file_name);
                continue;
            }
            match Snapshot::from_key(&format!("{}/{}", dir_name, file_name)) {
                Ok(snapshot) => out.push(snapshot),
                Err(e) => debug!("ignoring unrecognised file {:?}: {}", entry.path(), e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SnapStore for LocalSnapStore {
    async fn save(
        &self,
        snapshot: &Snapshot,
        data: Vec<u8>,
    ) -> Result<()> {
        let dir = self.chain_dir_path(snapshot);
        fs::create_dir_all(&dir).await.map_err(|e| path_error(&dir, e))?;

        let temp = self.temp_path(snapshot);
        let target = self.final_path(snapshot);
        if let Err(e) = write_then_rename(&temp, &target, &data).await {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("failed to remove temp file {:?}: {}", temp, cleanup);
                }
            }
            return Err(e);
        }
        debug!("saved snapshot {:?} ({} bytes)", target, data.len());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| path_error(&self.base_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| path_error(&self.base_dir, e))?
        {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if parse_chain_dir(&dir_name).is_none() || !is_dir {
                continue;
            }
            self.list_chain_dir(&dir_name, &mut snapshots).await?;
        }
        sort_snapshots(&mut snapshots);
        Ok(snapshots)
    }

    async fn fetch(
        &self,
        snapshot: &Snapshot,
    ) -> Result<Vec<u8>> {
        let path = self.final_path(snapshot);
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(snapshot.key()).into(),
            _ => path_error(&path, e),
        })
    }

    async fn delete(
        &self,
        snapshot: &Snapshot,
    ) -> Result<()> {
        let path = self.final_path(snapshot);
        match fs::remove_file(&path).await {
            Ok(()) => debug!("deleted snapshot {:?}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => trace!("snapshot {:?} already gone", path),
            Err(e) => return Err(path_error(&path, e)),
        }

        // Drop the chain directory once its last artifact is gone; fails harmlessly
        // while other artifacts remain.
        let _ = fs::remove_dir(self.chain_dir_path(snapshot)).await;
        Ok(())
    }
}

async fn write_then_rename(
    temp: &Path,
    target: &Path,
    data: &[u8],
) -> Result<()> {
    let mut file = fs::File::create(temp).await.map_err(|e| path_error(temp, e))?;
    file.write_all(data).await.map_err(|e| path_error(temp, e))?;
    file.sync_all().await.map_err(|e| path_error(temp, e))?;
    drop(file);
    fs::rename(temp, target).await.map_err(|e| path_error(target, e))?;
    Ok(())
}

fn path_error(
    path: &Path,
    source: std::io::Error,
) -> crate::Error {
    StorageError::PathError {
        path: path.to_path_buf(),
        source,
    }
    .into()
}
