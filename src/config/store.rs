use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreProvider {
    /// Local filesystem under `container/prefix`
    #[default]
    Local,
    /// Process memory; contents are lost on exit
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SnapstoreConfig {
    #[serde(default)]
    pub provider: StoreProvider,

    /// Root directory (or bucket) holding all chains
    #[serde(default = "default_container")]
    pub container: PathBuf,

    /// Sub-path inside the container, lets several stores share one container
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for SnapstoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreProvider::default(),
            container: default_container(),
            prefix: default_prefix(),
        }
    }
}

impl SnapstoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.provider == StoreProvider::Local && self.container.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "store.container is required for the Local provider".into(),
            ));
        }
        if self.prefix.split('/').any(|part| part == "..") {
            return Err(Error::InvalidConfig(format!(
                "store.prefix {:?} must not escape the container",
                self.prefix
            )));
        }
        Ok(())
    }
}

fn default_container() -> PathBuf {
    PathBuf::from("./backups")
}
fn default_prefix() -> String {
    "v2".to_string()
}
