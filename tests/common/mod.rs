//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::future::{ready, Ready};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::Service;

use upload_gate::config::{GateConfig, Secret};
use upload_gate::GateServer;

pub const TOKEN: &str = "token123";

/// Upload delegate that records what reached it and answers 200 "delegated".
#[derive(Clone, Default)]
pub struct RecordingDelegate {
    calls: Arc<Mutex<Vec<(Method, String)>>>,
}

impl RecordingDelegate {
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Service<Request> for RecordingDelegate {
    type Response = Response;
    type Error = Infallible;
    type Future = Ready<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.calls
            .lock()
            .unwrap()
            .push((request.method().clone(), request.uri().path().to_string()));
        ready(Ok((StatusCode::OK, "delegated").into_response()))
    }
}

/// Defaults with storage and static assets under `root`.
pub fn test_config(root: &Path) -> GateConfig {
    let mut config = GateConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upload.storage_dir = root.join("uploads");
    config.upload.static_dir = root.join("static");
    std::fs::create_dir_all(&config.upload.static_dir).unwrap();
    std::fs::create_dir_all(&config.upload.storage_dir).unwrap();
    config
}

pub fn secret() -> Secret {
    Secret::new(TOKEN).unwrap()
}

pub fn gate(config: GateConfig) -> (GateServer, RecordingDelegate) {
    let delegate = RecordingDelegate::default();
    let server = GateServer::with_delegate(config, secret(), delegate.clone()).unwrap();
    (server, delegate)
}

/// Request from `client` (sent as the proxy client-IP header).
pub fn request(method: Method, path: &str, client: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(path)
        .header("CF-Connecting-IP", client)
}

pub fn authorized(method: Method, path: &str, client: &str) -> Request {
    request(method, path, client)
        .header("X-Auth-Token", TOKEN)
        .body(Body::empty())
        .unwrap()
}

pub fn anonymous(method: Method, path: &str, client: &str) -> Request {
    request(method, path, client).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
