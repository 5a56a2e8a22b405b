pub mod client;
pub mod daemon;
pub mod db;
pub mod error;
pub mod exec;
pub mod lifecycle;
pub mod mounts;
pub mod relocate;
pub mod rewrite;
pub mod zfs;

// re-export selected public API
pub use common::{StorageDriver, StorageMetadata, StoragePool};
pub use daemon::DaemonHandle;
pub use error::{MigrateError, ResourceKind};
pub use exec::{CommandRunner, HostRunner};
pub use lifecycle::{InstallFlavor, LifecycleController, DEFAULT_TIMEOUT};
pub use mounts::MountInventory;
pub use relocate::RelocationEngine;
pub use rewrite::PathRewriter;
