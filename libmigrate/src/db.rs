use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Database file inside the data directory.
pub const DB_NAME: &str = "rkd.db";

/// Persists storage pool configuration changes into the daemon's durable
/// store.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn update_pool_source(&self, pool: &str, source: &str) -> Result<()>;
}

/// The daemon keeps pool configuration in a local sqlite database inside
/// the data directory.
pub struct SqlitePoolStore {
    db: SqlitePool,
}

impl SqlitePoolStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite://{}", path.display()))
            .await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl PoolStore for SqlitePoolStore {
    async fn update_pool_source(&self, pool: &str, source: &str) -> Result<()> {
        debug!("updating source of pool {pool} to {source}");
        sqlx::query(
            "UPDATE storage_pools_config SET value = ? \
             WHERE key = 'source' AND storage_pool_id = \
             (SELECT id FROM storage_pools WHERE name = ?)",
        )
        .bind(source)
        .bind(pool)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
