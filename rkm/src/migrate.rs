use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use libmigrate::client::UnixConnector;
use libmigrate::daemon::SOCKET_NAME;
use libmigrate::db::{SqlitePoolStore, DB_NAME};
use libmigrate::{
    CommandRunner, DaemonHandle, HostRunner, InstallFlavor, LifecycleController, MountInventory,
    PathRewriter, RelocationEngine,
};

pub struct MigrateArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    pub timeout: Duration,
    pub keep_source_package: bool,
}

/// The whole migration, strictly sequential: the daemon must be fully
/// stopped before the tree moves, and the tree fully rewritten before the
/// daemon restarts.
pub async fn run(args: MigrateArgs) -> Result<()> {
    let runner: Arc<dyn CommandRunner> = Arc::new(HostRunner);

    // Source daemon: take the inventory that the rewrite step needs.
    let source = DaemonHandle::connect(&args.source)
        .await
        .context("connecting to the source daemon")?;
    source.show_report();

    // The target install must exist and never have been used.
    let target = DaemonHandle::connect(&args.target)
        .await
        .context("connecting to the target daemon")?;
    target.check_empty()?;

    let mut metadata = source.storage_metadata();

    // Stop the target first so nothing races the move, then shut the
    // source down cleanly.
    let target_ctl = LifecycleController::new(
        InstallFlavor::for_data_dir(&args.target),
        runner.clone(),
    );
    target_ctl.stop().context("stopping the target daemon")?;

    let source_ctl = LifecycleController::new(
        InstallFlavor::for_data_dir(&args.source),
        runner.clone(),
    );
    source_ctl
        .shutdown(source.client(), args.timeout)
        .await
        .context("waiting for the source daemon to exit")?;
    source_ctl.stop().context("stopping the source units")?;

    // Tear down anything still mounted below the source tree, drop the
    // unused target tree, then move.
    MountInventory::new()
        .clean(&args.source)
        .context("cleaning up mounts")?;
    target_ctl
        .wipe(&args.target)
        .context("wiping the target data directory")?;
    RelocationEngine::new(runner.clone())
        .move_tree(&args.source, &args.target)
        .context("moving the data directory")?;

    // Every path reference in the moved tree still points at the old
    // root; rewrite them all before the daemon sees the tree.
    let store = SqlitePoolStore::open(&args.target.join(DB_NAME))
        .await
        .context("opening the daemon database")?;
    PathRewriter::new(&args.source, &args.target, runner.clone())
        .rewrite(&mut metadata, &store)
        .await
        .context("rewriting storage paths")?;

    // Bring the target back and make sure it serves.
    target_ctl.start().context("starting the target daemon")?;
    target_ctl
        .wait_ready(
            Arc::new(UnixConnector),
            args.target.join(SOCKET_NAME),
            args.timeout,
        )
        .await
        .context("waiting for the target daemon to serve")?;

    if !args.keep_source_package {
        source_ctl
            .uninstall()
            .context("removing the source package")?;
    }

    info!(
        "migration complete: {} -> {}",
        args.source.display(),
        args.target.display()
    );
    Ok(())
}

pub async fn report(dir: &Path) -> Result<()> {
    let daemon = DaemonHandle::connect(dir)
        .await
        .context("connecting to the daemon")?;
    daemon.show_report();
    Ok(())
}
