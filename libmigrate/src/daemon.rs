use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    ContainerSummary, ImageSummary, Network, ServerInfo, StorageMetadata, StoragePool,
    LEGACY_ZFS_POOL_KEY,
};

use crate::client::{ControlClient, UnixClient};
use crate::error::{MigrateError, ResourceKind, Result};

pub const SOCKET_NAME: &str = "unix.socket";

/// A control-API session plus a snapshot of the daemon's inventory.
///
/// `networks` and `storage_pools` stay `None` when the daemon does not
/// advertise the matching API extension; that is different from an empty
/// list and the precondition checks skip unsupported kinds.
pub struct DaemonHandle {
    client: Arc<dyn ControlClient>,
    path: PathBuf,

    pub info: ServerInfo,
    pub containers: Vec<ContainerSummary>,
    pub images: Vec<ImageSummary>,
    pub networks: Option<Vec<Network>>,
    pub storage_pools: Option<Vec<StoragePool>>,
}

impl DaemonHandle {
    /// Connect to the daemon rooted at `path` and take an initial
    /// inventory snapshot.
    pub async fn connect(path: &Path) -> Result<Self> {
        let client = UnixClient::connect(&path.join(SOCKET_NAME)).await?;
        Self::with_client(Arc::new(client), path).await
    }

    /// Build a handle over an existing session. Used directly by tests.
    pub async fn with_client(client: Arc<dyn ControlClient>, path: &Path) -> Result<Self> {
        let mut handle = Self {
            client,
            path: path.to_path_buf(),
            info: ServerInfo::default(),
            containers: Vec::new(),
            images: Vec::new(),
            networks: None,
            storage_pools: None,
        };
        handle.update().await?;
        Ok(handle)
    }

    /// Refresh the snapshot from the daemon.
    pub async fn update(&mut self) -> Result<()> {
        self.info = self.client.get_server().await?;
        self.containers = self.client.get_containers().await?;
        self.images = self.client.get_images().await?;

        if self.info.has_extension("network") {
            // Only managed networks belong to the daemon's data directory.
            let networks = self.client.get_networks().await?;
            self.networks = Some(networks.into_iter().filter(|n| n.managed).collect());
        }

        if self.info.has_extension("storage") {
            self.storage_pools = Some(self.client.get_storage_pools().await?);
        }

        Ok(())
    }

    /// Fail on the first non-empty resource kind, in a fixed order.
    /// Kinds the daemon does not support are skipped.
    pub fn check_empty(&self) -> Result<()> {
        if !self.containers.is_empty() {
            return Err(MigrateError::Precondition(ResourceKind::Containers));
        }

        if !self.images.is_empty() {
            return Err(MigrateError::Precondition(ResourceKind::Images));
        }

        if let Some(networks) = &self.networks
            && !networks.is_empty()
        {
            return Err(MigrateError::Precondition(ResourceKind::Networks));
        }

        if let Some(pools) = &self.storage_pools
            && !pools.is_empty()
        {
            return Err(MigrateError::Precondition(ResourceKind::StoragePools));
        }

        Ok(())
    }

    /// Print a short summary of the snapshot to the console.
    pub fn show_report(&self) {
        println!("Daemon version: {}", self.info.server_version);
        println!("Daemon PID: {}", self.info.server_pid);
        println!("Resources:");
        println!("  Containers: {}", self.containers.len());
        println!("  Images: {}", self.images.len());
        if let Some(networks) = &self.networks {
            println!("  Networks: {}", networks.len());
        }
        if let Some(pools) = &self.storage_pools {
            println!("  Storage pools: {}", pools.len());
        }
    }

    /// The storage metadata scheme this daemon uses.
    pub fn storage_metadata(&self) -> StorageMetadata {
        match &self.storage_pools {
            Some(pools) => StorageMetadata::Pools(pools.clone()),
            None => StorageMetadata::Legacy {
                zfs_pool: self.info.config.get(LEGACY_ZFS_POOL_KEY).cloned(),
            },
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.path
    }

    pub fn client(&self) -> Arc<dyn ControlClient> {
        self.client.clone()
    }
}
