use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::exec::CommandRunner;

/// A dataset name and its mountpoint as printed by `zfs list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub mountpoint: String,
}

impl Dataset {
    /// Datasets without a filesystem mountpoint print a sentinel instead
    /// of a path.
    pub fn has_mountpoint(&self) -> bool {
        self.mountpoint != "none" && self.mountpoint != "-"
    }
}

/// Thin wrapper over the `zfs` tool.
pub struct Zfs {
    runner: Arc<dyn CommandRunner>,
}

impl Zfs {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// All datasets under `pool`, recursively, with their mountpoints.
    pub fn list_datasets(&self, pool: &str) -> Result<Vec<Dataset>> {
        let output = self.runner.run(
            "zfs",
            &[
                "list", "-H", "-t", "all", "-o", "name,mountpoint", "-r", pool,
            ],
        )?;
        Ok(parse_dataset_list(&output))
    }

    pub fn set_mountpoint(&self, dataset: &str, mountpoint: &Path) -> Result<()> {
        debug!("setting mountpoint of {dataset} to {}", mountpoint.display());
        self.runner
            .run(
                "zfs",
                &[
                    "set",
                    &format!("mountpoint={}", mountpoint.display()),
                    dataset,
                ],
            )
            .map(|_| ())
    }
}

fn parse_dataset_list(output: &str) -> Vec<Dataset> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let mountpoint = fields.next()?;
            Some(Dataset {
                name: name.to_string(),
                mountpoint: mountpoint.to_string(),
            })
        })
        .collect()
}
