use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use common::{ContainerSummary, ImageSummary, Network, ServerInfo, StoragePool};

use crate::error::{MigrateError, Result};

/// Request/response session with the daemon's control API.
///
/// The transport is deliberately thin: the migration tool only needs the
/// inventory queries, the two internal endpoints and the event monitor.
#[async_trait]
pub trait ControlClient: Send + Sync {
    async fn get_server(&self) -> Result<ServerInfo>;
    async fn get_containers(&self) -> Result<Vec<ContainerSummary>>;
    async fn get_images(&self) -> Result<Vec<ImageSummary>>;
    async fn get_networks(&self) -> Result<Vec<Network>>;
    async fn get_storage_pools(&self) -> Result<Vec<StoragePool>>;

    /// Ask the daemon to exit once it is idle.
    async fn request_shutdown(&self) -> Result<()>;

    /// Probe the readiness endpoint of a freshly started daemon.
    async fn check_ready(&self) -> Result<()>;

    /// Subscribe to the event stream and block until the daemon closes it,
    /// which happens when the daemon process exits.
    async fn wait_events_closed(&self) -> Result<()>;
}

/// Creates control sessions; injected where a fresh connection is needed
/// per attempt (the readiness poll).
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, socket: &Path) -> Result<Arc<dyn ControlClient>>;
}

#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: String,
}

/// JSON-over-unix-socket client. One connection per request; the daemon
/// closes the stream after answering.
#[derive(Debug)]
pub struct UnixClient {
    socket: PathBuf,
}

impl UnixClient {
    /// Open a session against the daemon socket. The probe connection is
    /// dropped immediately; requests connect on demand.
    pub async fn connect(socket: &Path) -> Result<Self> {
        UnixStream::connect(socket)
            .await
            .map_err(|e| MigrateError::Connection {
                socket: socket.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            socket: socket.to_path_buf(),
        })
    }

    async fn request(&self, method: &str, path: &str) -> Result<serde_json::Value> {
        let query = format!("{method} {path}");
        let mut stream =
            UnixStream::connect(&self.socket)
                .await
                .map_err(|e| MigrateError::Connection {
                    socket: self.socket.clone(),
                    reason: e.to_string(),
                })?;

        debug!("control API request: {query}");

        let mut line = serde_json::to_vec(&serde_json::json!({
            "method": method,
            "path": path,
        }))
        .map_err(|e| query_error(&query, e))?;
        line.push(b'\n');

        stream
            .write_all(&line)
            .await
            .map_err(|e| query_error(&query, e))?;

        let mut reader = BufReader::new(stream);
        let mut body = String::new();
        reader
            .read_line(&mut body)
            .await
            .map_err(|e| query_error(&query, e))?;

        let resp: ApiResponse =
            serde_json::from_str(&body).map_err(|e| query_error(&query, e))?;
        if resp.status != "success" {
            return Err(MigrateError::Query {
                query,
                reason: resp.error,
            });
        }

        Ok(resp.data)
    }
}

fn query_error(query: &str, err: impl ToString) -> MigrateError {
    MigrateError::Query {
        query: query.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl ControlClient for UnixClient {
    async fn get_server(&self) -> Result<ServerInfo> {
        let data = self.request("GET", "/1.0").await?;
        serde_json::from_value(data).map_err(|e| query_error("GET /1.0", e))
    }

    async fn get_containers(&self) -> Result<Vec<ContainerSummary>> {
        let data = self.request("GET", "/1.0/containers").await?;
        serde_json::from_value(data).map_err(|e| query_error("GET /1.0/containers", e))
    }

    async fn get_images(&self) -> Result<Vec<ImageSummary>> {
        let data = self.request("GET", "/1.0/images").await?;
        serde_json::from_value(data).map_err(|e| query_error("GET /1.0/images", e))
    }

    async fn get_networks(&self) -> Result<Vec<Network>> {
        let data = self.request("GET", "/1.0/networks").await?;
        serde_json::from_value(data).map_err(|e| query_error("GET /1.0/networks", e))
    }

    async fn get_storage_pools(&self) -> Result<Vec<StoragePool>> {
        let data = self.request("GET", "/1.0/storage-pools").await?;
        serde_json::from_value(data).map_err(|e| query_error("GET /1.0/storage-pools", e))
    }

    async fn request_shutdown(&self) -> Result<()> {
        self.request("PUT", "/internal/shutdown").await.map(|_| ())
    }

    async fn check_ready(&self) -> Result<()> {
        self.request("GET", "/internal/ready").await.map(|_| ())
    }

    async fn wait_events_closed(&self) -> Result<()> {
        let mut stream =
            UnixStream::connect(&self.socket)
                .await
                .map_err(|e| MigrateError::Connection {
                    socket: self.socket.clone(),
                    reason: e.to_string(),
                })?;

        let mut line = serde_json::to_vec(&serde_json::json!({
            "method": "GET",
            "path": "/1.0/events",
        }))
        .map_err(|e| query_error("GET /1.0/events", e))?;
        line.push(b'\n');

        stream
            .write_all(&line)
            .await
            .map_err(|e| query_error("GET /1.0/events", e))?;

        // Event payloads are irrelevant here; only the stream closing
        // matters. A read error means the connection was torn down, which
        // counts as closed.
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return Ok(()),
                Ok(_) => continue,
            }
        }
    }
}

/// The default connector used outside of tests.
pub struct UnixConnector;

#[async_trait]
impl Connect for UnixConnector {
    async fn connect(&self, socket: &Path) -> Result<Arc<dyn ControlClient>> {
        Ok(Arc::new(UnixClient::connect(socket).await?))
    }
}
