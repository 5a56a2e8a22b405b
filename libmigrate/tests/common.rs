use async_trait::async_trait;
use std::fs;
use std::sync::{Arc, Mutex};

use libmigrate::db::PoolStore;
use libmigrate::error::{MigrateError, Result};
use libmigrate::CommandRunner;

/// Backs `mv` with a plain rename so relocation tests run without root.
/// Everything else is recorded and answered from the scripted zfs output.
#[derive(Default)]
pub struct FakeHost {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub zfs_list_output: String,
    pub fail_mv: bool,
}

impl CommandRunner for FakeHost {
    fn run(&self, tool: &str, args: &[&str]) -> Result<String> {
        self.calls.lock().unwrap().push((
            tool.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        ));

        match tool {
            "mv" => {
                if self.fail_mv {
                    return Err(exec_error(tool, args, "simulated failure"));
                }
                fs::rename(args[0], args[1])
                    .map_err(|e| exec_error(tool, args, &e.to_string()))?;
                Ok(String::new())
            }
            "zfs" if args.first() == Some(&"list") => Ok(self.zfs_list_output.clone()),
            _ => Ok(String::new()),
        }
    }
}

pub fn exec_error(tool: &str, args: &[&str], stderr: &str) -> MigrateError {
    MigrateError::Exec {
        tool: tool.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

#[allow(dead_code)]
pub fn recorded(host: &FakeHost) -> Vec<(String, Vec<String>)> {
    host.calls.lock().unwrap().clone()
}

/// In-memory stand-in for the daemon's sqlite store.
#[allow(dead_code)]
#[derive(Default, Clone)]
pub struct RecordingStore {
    pub updates: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl PoolStore for RecordingStore {
    async fn update_pool_source(&self, pool: &str, source: &str) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((pool.to_string(), source.to_string()));
        Ok(())
    }
}
