use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use common::{StorageDriver, StorageMetadata, POOL_SOURCE_KEY};

use crate::db::PoolStore;
use crate::error::{MigrateError, Result};
use crate::exec::CommandRunner;
use crate::zfs::Zfs;

/// Replace an `old_root` prefix of `path` with `new_root`; identity when
/// the path does not start with `old_root`.
pub fn rewrite_prefix(path: &str, old_root: &str, new_root: &str) -> String {
    match path.strip_prefix(old_root) {
        Some(rest) => format!("{new_root}{rest}"),
        None => path.to_string(),
    }
}

/// Rewrites every on-disk and persisted reference to the old data root so
/// it points at the new one: container symlinks, ZFS dataset mountpoints
/// and storage pool sources.
pub struct PathRewriter {
    old_root: PathBuf,
    new_root: PathBuf,
    zfs: Zfs,
}

impl PathRewriter {
    pub fn new(old_root: &Path, new_root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            old_root: old_root.to_path_buf(),
            new_root: new_root.to_path_buf(),
            zfs: Zfs::new(runner),
        }
    }

    /// Run the full rewrite. Pool records are updated both in the durable
    /// store and in `metadata` so the caller's snapshot stays accurate.
    pub async fn rewrite(
        &self,
        metadata: &mut StorageMetadata,
        store: &dyn PoolStore,
    ) -> Result<()> {
        // The daemon keeps a symlink per container at the top of the
        // containers directory, pointing into the storage backend.
        let containers = self.new_root.join("containers");
        if containers.is_dir() {
            for entry in fs::read_dir(&containers)? {
                self.rewrite_symlink(&entry?.path())?;
            }
        }

        match metadata {
            StorageMetadata::Legacy { zfs_pool } => {
                if let Some(pool) = zfs_pool {
                    self.rewrite_zfs_pool(pool)?;
                }
            }
            StorageMetadata::Pools(pools) => {
                for pool in pools.iter_mut() {
                    if let Some(source) = pool.source().map(str::to_string) {
                        let new_source = rewrite_prefix(
                            &source,
                            &self.old_root.to_string_lossy(),
                            &self.new_root.to_string_lossy(),
                        );
                        if source != new_source {
                            info!("updating source of pool {}", pool.name);
                            store
                                .update_pool_source(&pool.name, &new_source)
                                .await
                                .map_err(|e| MigrateError::rewrite(pool.name.clone(), e))?;
                            pool.config.insert(POOL_SOURCE_KEY.to_string(), new_source);
                        }
                    }

                    match &pool.driver {
                        StorageDriver::Zfs => {
                            // A zfs pool without a pool name is broken
                            // config; the zfs invocation reports it.
                            let zpool = pool.zfs_pool_name().unwrap_or_default();
                            self.rewrite_zfs_pool(zpool)?;
                        }
                        StorageDriver::Dir => {
                            self.rewrite_symlink(
                                &self.new_root.join("storage-pools").join(&pool.name),
                            )?;
                        }
                        StorageDriver::Other(_) => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// Re-point a symlink whose target starts with the old root. Entries
    /// that are not symlinks are left alone.
    fn rewrite_symlink(&self, path: &Path) -> Result<()> {
        let Ok(target) = fs::read_link(path) else {
            return Ok(());
        };

        let target = target.to_string_lossy();
        let new_target = rewrite_prefix(
            &target,
            &self.old_root.to_string_lossy(),
            &self.new_root.to_string_lossy(),
        );
        if new_target != target {
            debug!("relinking {} to {new_target}", path.display());
            let link_error = |e: std::io::Error| {
                MigrateError::rewrite(path.display().to_string(), e.into())
            };
            fs::remove_file(path).map_err(link_error)?;
            symlink(&new_target, path).map_err(link_error)?;
        }

        Ok(())
    }

    /// Point every dataset of `zpool` that mounts under the old root at
    /// the rewritten path. Sentinel mountpoints ("none", "-") are skipped.
    fn rewrite_zfs_pool(&self, zpool: &str) -> Result<()> {
        let datasets = self
            .zfs
            .list_datasets(zpool)
            .map_err(|e| MigrateError::rewrite(zpool.to_string(), e))?;

        let old_root = self.old_root.to_string_lossy().into_owned();
        let new_root = self.new_root.to_string_lossy().into_owned();

        for dataset in datasets {
            if !dataset.has_mountpoint() {
                continue;
            }
            if !dataset.mountpoint.starts_with(&old_root) {
                continue;
            }

            let mountpoint = rewrite_prefix(&dataset.mountpoint, &old_root, &new_root);
            self.zfs
                .set_mountpoint(&dataset.name, Path::new(&mountpoint))
                .map_err(|e| MigrateError::rewrite(dataset.name.clone(), e))?;
        }

        Ok(())
    }
}
