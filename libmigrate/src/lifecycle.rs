use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info};

use crate::client::{Connect, ControlClient};
use crate::error::{MigrateError, Result};
use crate::exec::CommandRunner;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

const SNAP_UNIT: &str = "snap.rkd.daemon.service";
const SYSTEMD_UNITS: [&str; 2] = ["rkd.service", "rkd.socket"];
const UPSTART_JOB: &str = "rkd";

/// How the daemon was installed, which decides the service-manager units
/// to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallFlavor {
    Snap,
    Upstart,
    Systemd,
}

impl InstallFlavor {
    /// Pure classification from the data directory and the running init
    /// system.
    pub fn classify(data_dir: &Path, init: &str) -> Self {
        if data_dir.starts_with("/var/snap") {
            return Self::Snap;
        }
        if init == "upstart" {
            return Self::Upstart;
        }
        Self::Systemd
    }

    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self::classify(data_dir, &init_system())
    }
}

/// Name of the running init system. Upstart's pid 1 calls itself "init";
/// the initctl binary tells it apart from sysvinit.
fn init_system() -> String {
    match fs::read_to_string("/proc/1/comm") {
        Ok(comm) if comm.trim() == "systemd" => "systemd".to_string(),
        Ok(_) if Path::new("/sbin/initctl").exists() => "upstart".to_string(),
        Ok(comm) => comm.trim().to_string(),
        Err(_) => "systemd".to_string(),
    }
}

/// Sequences daemon stop/shutdown-wait/start/restart and dispatches to the
/// right service-manager units for the install flavor.
pub struct LifecycleController {
    flavor: InstallFlavor,
    runner: Arc<dyn CommandRunner>,
}

impl LifecycleController {
    pub fn new(flavor: InstallFlavor, runner: Arc<dyn CommandRunner>) -> Self {
        Self { flavor, runner }
    }

    pub fn start(&self) -> Result<()> {
        self.service_ctl("start")
    }

    pub fn stop(&self) -> Result<()> {
        self.service_ctl("stop")
    }

    /// Reload the daemon, restarting where the unit does not support a
    /// plain reload.
    pub fn reload(&self) -> Result<()> {
        match self.flavor {
            InstallFlavor::Snap => self.systemctl("reload", &[SNAP_UNIT]),
            InstallFlavor::Upstart => self.initctl("restart"),
            InstallFlavor::Systemd => self.systemctl("restart", &SYSTEMD_UNITS),
        }
    }

    fn service_ctl(&self, action: &str) -> Result<()> {
        match self.flavor {
            InstallFlavor::Snap => self.systemctl(action, &[SNAP_UNIT]),
            InstallFlavor::Upstart => self.initctl(action),
            InstallFlavor::Systemd => self.systemctl(action, &SYSTEMD_UNITS),
        }
    }

    fn systemctl(&self, action: &str, units: &[&str]) -> Result<()> {
        let mut args = vec![action];
        args.extend_from_slice(units);
        self.runner.run("systemctl", &args).map(|_| ())
    }

    fn initctl(&self, action: &str) -> Result<()> {
        self.runner.run("initctl", &[action, UPSTART_JOB]).map(|_| ())
    }

    /// Ask the daemon to exit and wait for its event stream to close,
    /// bounded by `timeout`.
    ///
    /// The monitor runs in its own task and writes one value into a
    /// capacity-one channel; whichever of that signal and the timer fires
    /// first decides the outcome. The losing task is simply abandoned.
    pub async fn shutdown(
        &self,
        client: Arc<dyn ControlClient>,
        timeout: Duration,
    ) -> Result<()> {
        client.request_shutdown().await?;

        let (tx, mut rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            // A monitor that fails to subscribe means the daemon is
            // already gone, which counts as done.
            let _ = client.wait_events_closed().await;
            let _ = tx.send(()).await;
        });

        tokio::select! {
            _ = rx.recv() => {
                info!("daemon has exited");
                Ok(())
            }
            _ = time::sleep(timeout) => Err(MigrateError::Timeout {
                operation: "daemon shutdown",
                bound_secs: timeout.as_secs(),
            }),
        }
    }

    /// Poll a freshly started daemon until it answers the readiness probe,
    /// bounded by `timeout`.
    pub async fn wait_ready(
        &self,
        connector: Arc<dyn Connect>,
        socket: PathBuf,
        timeout: Duration,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            loop {
                if let Ok(client) = connector.connect(&socket).await
                    && client.check_ready().await.is_ok()
                {
                    let _ = tx.send(()).await;
                    return;
                }
                time::sleep(READY_POLL_INTERVAL).await;
            }
        });

        tokio::select! {
            _ = rx.recv() => {
                info!("daemon is ready");
                Ok(())
            }
            _ = time::sleep(timeout) => Err(MigrateError::Timeout {
                operation: "daemon readiness",
                bound_secs: timeout.as_secs(),
            }),
        }
    }

    /// Remove the old daemon package once its data has moved.
    pub fn uninstall(&self) -> Result<()> {
        match self.flavor {
            InstallFlavor::Snap => self.runner.run("snap", &["remove", "rkd"]).map(|_| ()),
            _ => self
                .runner
                .run("apt-get", &["remove", "--purge", "--yes", "rkd", "rkd-client"])
                .map(|_| ()),
        }
    }

    /// Delete a leftover data directory. Already-gone is fine.
    pub fn wipe(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        debug!("wiping {}", path.display());
        fs::remove_dir_all(path)?;
        Ok(())
    }
}
