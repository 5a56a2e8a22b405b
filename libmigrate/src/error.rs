use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Resource kinds checked before a migration may proceed, in the order the
/// checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Containers,
    Images,
    Networks,
    StoragePools,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Containers => write!(f, "containers"),
            Self::Images => write!(f, "images"),
            Self::Networks => write!(f, "networks"),
            Self::StoragePools => write!(f, "storage pools"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("failed to connect to the daemon at {}: {reason}", .socket.display())]
    Connection { socket: PathBuf, reason: String },

    #[error("daemon query {query} failed: {reason}")]
    Query { query: String, reason: String },

    #[error("target daemon already has {0}, aborting")]
    Precondition(ResourceKind),

    #[error("{operation} did not complete within {bound_secs}s")]
    Timeout {
        operation: &'static str,
        bound_secs: u64,
    },

    #[error("unable to unmount {}: {source}", .path.display())]
    Unmount { path: PathBuf, source: nix::Error },

    #[error("failed to move {} to {}: {source}", .src.display(), .dst.display())]
    Move {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("failed to rewrite {target}: {source}")]
    Rewrite {
        target: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("{tool} {args:?} failed ({status}): {stderr}")]
    Exec {
        tool: String,
        args: Vec<String>,
        status: String,
        stderr: String,
    },

    #[error("storage pool database update failed: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Wrap an error as a rewrite failure against the named dataset, pool
    /// or symlink.
    pub fn rewrite(target: impl Into<String>, source: MigrateError) -> Self {
        Self::Rewrite {
            target: target.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T, E = MigrateError> = std::result::Result<T, E>;
