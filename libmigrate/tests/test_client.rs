use libmigrate::client::{ControlClient, UnixClient};
use libmigrate::MigrateError;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

/// Minimal control-API endpoint: answers each connection with a canned
/// response keyed by request path, then closes it.
async fn serve(listener: UnixListener) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };

        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            if reader.read_line(&mut line).await.is_err() {
                return;
            }
            let request: serde_json::Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => return,
            };

            let response = match request["path"].as_str() {
                Some("/1.0") => json!({
                    "status": "success",
                    "data": {
                        "server_version": "5.21",
                        "server_pid": 4242,
                        "config": {"storage.zfs_pool_name": "tank"},
                        "api_extensions": ["network", "storage"],
                    },
                }),
                Some("/1.0/containers") => json!({
                    "status": "success",
                    "data": [{"name": "c1", "status": "Stopped"}],
                }),
                Some("/1.0/events") => {
                    // Hold the stream open briefly, then drop it; the
                    // client treats the close as daemon exit.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    return;
                }
                Some("/internal/ready") => json!({
                    "status": "error",
                    "error": "daemon is still starting",
                }),
                _ => json!({"status": "success", "data": null}),
            };

            let mut body = response.to_string().into_bytes();
            body.push(b'\n');
            let mut stream = reader.into_inner();
            let _ = stream.write_all(&body).await;
        });
    }
}

async fn start_server(dir: &Path) -> std::path::PathBuf {
    let socket = dir.join("unix.socket");
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(serve(listener));
    socket
}

#[tokio::test]
async fn queries_decode_typed_responses() {
    let tmp = tempfile::tempdir().unwrap();
    let socket = start_server(tmp.path()).await;

    let client = UnixClient::connect(&socket).await.unwrap();

    let info = client.get_server().await.unwrap();
    assert_eq!(info.server_version, "5.21");
    assert_eq!(info.server_pid, 4242);
    assert!(info.has_extension("storage"));
    assert_eq!(
        info.config.get("storage.zfs_pool_name").map(String::as_str),
        Some("tank")
    );

    let containers = client.get_containers().await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name, "c1");
}

#[tokio::test]
async fn error_status_maps_to_query_error() {
    let tmp = tempfile::tempdir().unwrap();
    let socket = start_server(tmp.path()).await;

    let client = UnixClient::connect(&socket).await.unwrap();
    match client.check_ready().await.unwrap_err() {
        MigrateError::Query { query, reason } => {
            assert_eq!(query, "GET /internal/ready");
            assert_eq!(reason, "daemon is still starting");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn event_stream_close_unblocks_waiter() {
    let tmp = tempfile::tempdir().unwrap();
    let socket = start_server(tmp.path()).await;

    let client = UnixClient::connect(&socket).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), client.wait_events_closed())
        .await
        .expect("waiter did not notice the stream closing")
        .unwrap();
}

#[tokio::test]
async fn missing_socket_is_a_connection_error() {
    let tmp = tempfile::tempdir().unwrap();
    let socket = tmp.path().join("unix.socket");

    match UnixClient::connect(&socket).await.unwrap_err() {
        MigrateError::Connection { socket: reported, .. } => assert_eq!(reported, socket),
        other => panic!("unexpected error: {other}"),
    }
}
