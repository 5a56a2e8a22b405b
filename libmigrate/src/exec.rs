use std::process::Command;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// External command execution.
///
/// Everything that shells out (`mv`, `zfs`, the service manager, the
/// package manager) goes through this trait so the relocation and rewrite
/// logic can run against a fake in tests.
pub trait CommandRunner: Send + Sync {
    /// Run the tool to completion and return its stdout. A non-zero exit
    /// status is an error.
    fn run(&self, tool: &str, args: &[&str]) -> Result<String>;
}

/// Runs commands on the host.
#[derive(Debug, Default)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn run(&self, tool: &str, args: &[&str]) -> Result<String> {
        debug!("running {tool} {args:?}");

        let output = Command::new(tool).args(args).output().map_err(|e| {
            MigrateError::Exec {
                tool: tool.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                status: "failed to spawn".to_string(),
                stderr: e.to_string(),
            }
        })?;

        if !output.status.success() {
            return Err(MigrateError::Exec {
                tool: tool.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
