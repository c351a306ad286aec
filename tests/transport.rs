//! Socket-level behavior: peer identity, slow and idle connections, shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use upload_gate::config::GateConfig;
use upload_gate::http::ServerError;
use upload_gate::net::Listener;
use upload_gate::Shutdown;

mod common;
use common::{gate, test_config, RecordingDelegate, TOKEN};

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    delegate: RecordingDelegate,
    registry: std::sync::Arc<upload_gate::security::ClientRegistry>,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(config: GateConfig) -> Running {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections).unwrap();
    let addr = listener.local_addr().unwrap();

    let (server, delegate) = gate(config);
    let registry = server.registry();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, signal));

    Running {
        addr,
        shutdown,
        delegate,
        registry,
        handle,
    }
}

#[tokio::test]
async fn peer_address_identifies_direct_clients() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.rate_limit.trust_proxy_header = false;
    let running = start(config).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/files/", running.addr))
        .header("X-Auth-Token", TOKEN)
        .header("Upload-Length", "10")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.text().await.unwrap(), "delegated");

    assert!(running.registry.contains("127.0.0.1"));
    assert_eq!(running.delegate.count(), 1);

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn proxy_header_wins_over_peer_address() {
    let dir = tempfile::tempdir().unwrap();
    let running = start(test_config(dir.path())).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/files/abc", running.addr))
        .header("CF-Connecting-IP", "203.0.113.5")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert!(running.registry.contains("203.0.113.5"));
    assert!(!running.registry.contains("127.0.0.1"));

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn slow_headers_are_cut_off() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.header_read_secs = 1;
    let running = start(config).await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream.write_all(b"GET /files/abc HTTP/1.1\r\nHost: gate\r\n").await.unwrap();

    // The server gives up on the request and closes the socket.
    let mut buf = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
    assert!(closed.is_ok(), "connection stayed open past the header deadline");
    assert_eq!(running.delegate.count(), 0);

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn idle_keep_alive_connections_are_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.idle_secs = 1;
    let running = start(config).await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(b"GET /files/abc HTTP/1.1\r\nHost: gate\r\n\r\n")
        .await
        .unwrap();

    let mut buf = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(4), stream.read_to_end(&mut buf)).await;
    assert!(closed.is_ok(), "idle connection was not closed");

    let response = String::from_utf8_lossy(&buf);
    assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {}", response);
    assert!(response.ends_with("delegated"));

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let dir = tempfile::tempdir().unwrap();
    let running = start(test_config(dir.path())).await;

    let response = reqwest::get(format!("http://{}/files/abc", running.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    running.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), running.handle)
        .await
        .expect("server did not stop");
    assert!(result.unwrap().is_ok());

    assert!(TcpStream::connect(running.addr).await.is_err());
}
