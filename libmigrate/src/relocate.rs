use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use nix::sys::stat::lstat;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::exec::CommandRunner;

/// Moves a daemon data directory to a new root.
pub struct RelocationEngine {
    runner: Arc<dyn CommandRunner>,
}

impl RelocationEngine {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Move `old_root` to `new_root`, then make sure `new_root/logs`
    /// exists (the daemon refuses to start without it).
    ///
    /// A failure partway through the child-by-child branch leaves the tree
    /// split between the two roots; no recovery is attempted.
    pub fn move_tree(&self, old_root: &Path, new_root: &Path) -> Result<()> {
        let on_own_mount = is_mount_point(old_root)?;
        self.move_with(old_root, new_root, on_own_mount)
    }

    /// Mount-aware entry point for callers that already inspected the
    /// mount table.
    pub fn move_with(
        &self,
        old_root: &Path,
        new_root: &Path,
        root_is_mount_point: bool,
    ) -> Result<()> {
        if root_is_mount_point {
            // Moving the directory itself would destroy the mount; move
            // its content entry by entry instead.
            info!(
                "{} is a mount point, moving entries individually",
                old_root.display()
            );
            fs::create_dir_all(new_root)?;

            for entry in fs::read_dir(old_root)? {
                let entry = entry?;
                self.mv(&entry.path(), &new_root.join(entry.file_name()))?;
            }
        } else {
            self.mv(old_root, new_root)?;
        }

        let logs = new_root.join("logs");
        if !logs.exists() {
            fs::create_dir_all(&logs)?;
        }

        Ok(())
    }

    fn mv(&self, src: &Path, dst: &Path) -> Result<()> {
        debug!("moving {} to {}", src.display(), dst.display());
        self.runner
            .run("mv", &[&*src.to_string_lossy(), &*dst.to_string_lossy()])
            .map(|_| ())
            .map_err(|e| MigrateError::Move {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source: Box::new(e),
            })
    }
}

/// Whether `path` sits on a different device than its parent.
pub fn is_mount_point(path: &Path) -> Result<bool> {
    let stat = lstat(path).map_err(io::Error::from)?;
    let Some(parent) = path.parent() else {
        // "/" has no parent and is always a mount point.
        return Ok(true);
    };
    let parent_stat = lstat(parent).map_err(io::Error::from)?;
    Ok(stat.st_dev != parent_stat.st_dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_a_mount_point() {
        assert!(is_mount_point(Path::new("/")).unwrap());
    }

    #[test]
    fn plain_directory_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("data");
        fs::create_dir(&sub).unwrap();
        assert!(!is_mount_point(&sub).unwrap());
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(is_mount_point(Path::new("/nonexistent-rkm-test")).is_err());
    }
}
