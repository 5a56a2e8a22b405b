use std::fs;
use std::path::{Path, PathBuf};

use nix::mount::{umount2, MntFlags};
use tracing::debug;

use crate::error::{MigrateError, Result};

pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Field index of the mount path in a mountinfo line.
const MOUNT_PATH_FIELD: usize = 4;

/// Detaches a single mount. The real implementation issues a lazy unmount,
/// which returns immediately and completes once the mount is no longer busy.
pub trait Detach: Send + Sync {
    fn detach(&self, path: &Path) -> std::result::Result<(), nix::Error>;
}

pub struct LazyUnmount;

impl Detach for LazyUnmount {
    fn detach(&self, path: &Path) -> std::result::Result<(), nix::Error> {
        umount2(path, MntFlags::MNT_DETACH)
    }
}

/// Active mounts below a data directory, as seen by the kernel.
pub struct MountInventory {
    table_path: PathBuf,
    detacher: Box<dyn Detach>,
}

impl Default for MountInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MountInventory {
    pub fn new() -> Self {
        Self {
            table_path: PathBuf::from(MOUNTINFO_PATH),
            detacher: Box::new(LazyUnmount),
        }
    }

    /// Override the mount table source and detach operation. Test seam.
    pub fn with_parts(table_path: PathBuf, detacher: Box<dyn Detach>) -> Self {
        Self {
            table_path,
            detacher,
        }
    }

    /// Lazily detach every mount strictly below `root`, deepest first.
    /// The root itself is left mounted. The first failure aborts.
    pub fn clean(&self, root: &Path) -> Result<()> {
        let table = fs::read_to_string(&self.table_path)?;

        for mount in mounts_under(&table, root) {
            debug!("detaching {}", mount.display());
            self.detacher
                .detach(&mount)
                .map_err(|e| MigrateError::Unmount {
                    path: mount,
                    source: e,
                })?;
        }

        Ok(())
    }
}

/// Parse a mount table and return the mounts under `root`, excluding the
/// root itself, sorted in reverse lexicographic order.
///
/// The reverse sort approximates deepest-nested-first; sibling paths of
/// differing depth that share a prefix can be mis-ordered by it (see
/// DESIGN.md), which matches the long-standing behavior of the tool.
pub fn mounts_under(table: &str, root: &Path) -> Vec<PathBuf> {
    let root_str = root.to_string_lossy().into_owned();

    let mut mounts: Vec<&str> = table
        .lines()
        .filter_map(|line| {
            let path = line.split(' ').nth(MOUNT_PATH_FIELD)?;
            path.starts_with(&root_str).then_some(path)
        })
        .collect();

    mounts.sort_unstable();
    mounts.reverse();

    mounts
        .into_iter()
        .filter(|m| Path::new(m) != root)
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn mountinfo_line(id: u32, path: &str) -> String {
        format!("{id} 25 0:40 / {path} rw,relatime shared:1 - zfs tank/sub rw\n")
    }

    fn table(paths: &[&str]) -> String {
        paths
            .iter()
            .enumerate()
            .map(|(i, p)| mountinfo_line(30 + i as u32, p))
            .collect()
    }

    #[derive(Default, Clone)]
    struct Recorder {
        detached: Arc<Mutex<Vec<PathBuf>>>,
        fail_on: Option<PathBuf>,
    }

    impl Detach for Recorder {
        fn detach(&self, path: &Path) -> std::result::Result<(), nix::Error> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(nix::Error::EBUSY);
            }
            self.detached.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn deepest_first_excluding_root() {
        let table = table(&["/a", "/a/b", "/a/b/c", "/a/d", "/other"]);
        let mounts = mounts_under(&table, Path::new("/a"));
        assert_eq!(
            mounts,
            vec![
                PathBuf::from("/a/d"),
                PathBuf::from("/a/b/c"),
                PathBuf::from("/a/b"),
            ]
        );
    }

    #[test]
    fn every_child_detaches_before_its_parent() {
        // {/a/b, /a/b/c, /a/d} detach as [/a/d, /a/b/c, /a/b]: every child
        // before its parent, /a never touched.
        let table = table(&["/a/b", "/a/b/c", "/a/d", "/a"]);
        let mounts = mounts_under(&table, Path::new("/a"));
        assert!(!mounts.contains(&PathBuf::from("/a")));
        let b = mounts.iter().position(|m| m == Path::new("/a/b")).unwrap();
        let bc = mounts
            .iter()
            .position(|m| m == Path::new("/a/b/c"))
            .unwrap();
        assert!(bc < b, "child must detach before its parent");
    }

    #[test]
    fn clean_detaches_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("mountinfo");
        let mut f = std::fs::File::create(&table_path).unwrap();
        f.write_all(table(&["/a", "/a/b", "/a/b/c", "/a/d"]).as_bytes())
            .unwrap();

        let recorder = Recorder::default();
        let inventory = MountInventory::with_parts(table_path, Box::new(recorder.clone()));
        inventory.clean(Path::new("/a")).unwrap();

        assert_eq!(
            *recorder.detached.lock().unwrap(),
            vec![
                PathBuf::from("/a/d"),
                PathBuf::from("/a/b/c"),
                PathBuf::from("/a/b"),
            ]
        );
    }

    #[test]
    fn clean_aborts_on_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("mountinfo");
        let mut f = std::fs::File::create(&table_path).unwrap();
        f.write_all(table(&["/a/b", "/a/b/c", "/a/d"]).as_bytes())
            .unwrap();

        let recorder = Recorder {
            fail_on: Some(PathBuf::from("/a/b/c")),
            ..Default::default()
        };
        let inventory = MountInventory::with_parts(table_path, Box::new(recorder.clone()));

        match inventory.clean(Path::new("/a")).unwrap_err() {
            MigrateError::Unmount { path, .. } => assert_eq!(path, PathBuf::from("/a/b/c")),
            other => panic!("unexpected error: {other}"),
        }
        // /a/d was detached before the failure, /a/b never reached.
        assert_eq!(
            *recorder.detached.lock().unwrap(),
            vec![PathBuf::from("/a/d")]
        );
    }
}
