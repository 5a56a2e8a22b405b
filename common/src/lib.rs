use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server configuration key holding the ZFS pool name on daemons that
/// predate per-pool storage records.
pub const LEGACY_ZFS_POOL_KEY: &str = "storage.zfs_pool_name";

/// Per-pool configuration keys.
pub const POOL_SOURCE_KEY: &str = "source";
pub const POOL_ZFS_NAME_KEY: &str = "zfs.pool_name";

/// State reported by the daemon about itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub server_pid: i64,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(default)]
    pub api_extensions: Vec<String>,
}

impl ServerInfo {
    /// Whether the daemon advertises the named API extension.
    pub fn has_extension(&self, name: &str) -> bool {
        self.api_extensions.iter().any(|e| e == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    pub fingerprint: String,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub managed: bool,
}

/// Storage backend of a pool. Drivers the tool does not rewrite are kept
/// as-is so the match on them stays exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageDriver {
    Zfs,
    Dir,
    Other(String),
}

impl From<String> for StorageDriver {
    fn from(s: String) -> Self {
        match s.as_str() {
            "zfs" => Self::Zfs,
            "dir" => Self::Dir,
            _ => Self::Other(s),
        }
    }
}

impl From<StorageDriver> for String {
    fn from(d: StorageDriver) -> Self {
        match d {
            StorageDriver::Zfs => "zfs".to_string(),
            StorageDriver::Dir => "dir".to_string(),
            StorageDriver::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePool {
    pub name: String,
    pub driver: StorageDriver,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl StoragePool {
    pub fn source(&self) -> Option<&str> {
        self.config.get(POOL_SOURCE_KEY).map(String::as_str)
    }

    pub fn zfs_pool_name(&self) -> Option<&str> {
        self.config.get(POOL_ZFS_NAME_KEY).map(String::as_str)
    }
}

/// How storage metadata is available on the daemon being migrated.
///
/// Older daemons only carry a single optional ZFS pool name in the server
/// config; newer ones expose per-pool records.
#[derive(Debug, Clone)]
pub enum StorageMetadata {
    Legacy { zfs_pool: Option<String> },
    Pools(Vec<StoragePool>),
}
