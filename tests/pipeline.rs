//! End-to-end behavior of the gate pipeline, driven without a socket.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use tower::ServiceExt;

mod common;
use common::{anonymous, authorized, body_string, gate, request, test_config, TOKEN};

const HARDENING: [&str; 5] = [
    "x-content-type-options",
    "x-frame-options",
    "strict-transport-security",
    "referrer-policy",
    "content-security-policy",
];

fn assert_hardened(response: &axum::response::Response) {
    for name in HARDENING {
        assert!(
            response.headers().contains_key(name),
            "missing {} on {}",
            name,
            response.status()
        );
    }
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}

#[tokio::test(start_paused = true)]
async fn burst_then_throttle_then_recover() {
    let dir = tempfile::tempdir().unwrap();
    let (server, delegate) = gate(test_config(dir.path()));
    let router = server.router();

    for _ in 0..5 {
        let response = router
            .clone()
            .oneshot(authorized(Method::POST, "/files/", "1.2.3.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::advance(Duration::from_millis(20)).await;
    }

    tokio::time::advance(Duration::from_millis(10)).await;
    let response = router
        .clone()
        .oneshot(authorized(Method::POST, "/files/", "1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_string(response).await, "Too Many Requests");
    assert_eq!(delegate.count(), 5);

    tokio::time::advance(Duration::from_millis(500)).await;
    let response = router
        .clone()
        .oneshot(authorized(Method::POST, "/files/", "1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(delegate.count(), 6);
}

#[tokio::test(start_paused = true)]
async fn clients_are_throttled_independently() {
    let dir = tempfile::tempdir().unwrap();
    let (server, _delegate) = gate(test_config(dir.path()));
    let router = server.router();

    for _ in 0..5 {
        let response = router
            .clone()
            .oneshot(anonymous(Method::GET, "/files/abc", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let exhausted = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/abc", "10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(exhausted.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/abc", "10.0.0.2"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    let registry = server.registry();
    assert!(registry.contains("10.0.0.1"));
    assert!(registry.contains("10.0.0.2"));
    assert_eq!(registry.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn untrusted_proxy_header_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.rate_limit.trust_proxy_header = false;
    let (server, _delegate) = gate(config);
    let router = server.router();

    // No peer address without a socket, so every client lands in the same
    // (empty) identity regardless of the header it sends.
    for i in 0..5 {
        let client = format!("10.0.0.{}", i);
        let response = router
            .clone()
            .oneshot(anonymous(Method::GET, "/files/abc", &client))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/abc", "10.0.0.99"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(server.registry().contains(""));
}

#[tokio::test(start_paused = true)]
async fn disabled_rate_limit_admits_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.rate_limit.enabled = false;
    let (server, delegate) = gate(config);
    let router = server.router();

    for _ in 0..20 {
        let response = router
            .clone()
            .oneshot(anonymous(Method::HEAD, "/files/abc", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(delegate.count(), 20);
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn mutations_require_the_token() {
    let dir = tempfile::tempdir().unwrap();
    let (server, delegate) = gate(test_config(dir.path()));
    let router = server.router();

    for (i, method) in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
        .into_iter()
        .enumerate()
    {
        let client = format!("192.0.2.{}", i);

        let missing = router
            .clone()
            .oneshot(anonymous(method.clone(), "/files/abc", &client))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = router
            .clone()
            .oneshot(
                request(method.clone(), "/files/abc", &client)
                    .header("X-Auth-Token", "token124")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(wrong).await, "Unauthorized");

        let right = router
            .clone()
            .oneshot(authorized(method.clone(), "/files/abc", &client))
            .await
            .unwrap();
        assert_eq!(right.status(), StatusCode::OK);
    }

    let reached: Vec<Method> = delegate.calls().into_iter().map(|(m, _)| m).collect();
    assert_eq!(
        reached,
        vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
    );
}

#[tokio::test]
async fn reads_need_no_token() {
    let dir = tempfile::tempdir().unwrap();
    let (server, delegate) = gate(test_config(dir.path()));
    let router = server.router();

    for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
        let response = router
            .clone()
            .oneshot(anonymous(method, "/files/abc", "192.0.2.50"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(delegate.count(), 3);
}

#[tokio::test]
async fn method_override_is_gated_like_the_method_it_names() {
    let dir = tempfile::tempdir().unwrap();
    let (server, delegate) = gate(test_config(dir.path()));

    let tunneled = request(Method::POST, "/files/abc", "192.0.2.60")
        .header("X-HTTP-Method-Override", "PATCH")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(tunneled).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let disguised = request(Method::GET, "/files/abc", "192.0.2.60")
        .header("X-HTTP-Method-Override", "DELETE")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(disguised).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A read-only override never downgrades a mutating request.
    for (i, method) in [Method::POST, Method::PATCH, Method::DELETE].into_iter().enumerate() {
        let downgraded = request(method.clone(), "/files/abc", &format!("192.0.2.{}", 61 + i))
            .header("X-HTTP-Method-Override", "GET")
            .body(Body::empty())
            .unwrap();
        let response = server.router().oneshot(downgraded).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} passed as GET", method);
    }
    assert_eq!(delegate.count(), 0);
}

#[tokio::test]
async fn rejections_are_hardened() {
    let dir = tempfile::tempdir().unwrap();
    let (server, _delegate) = gate(test_config(dir.path()));
    let router = server.router();

    let unauthorized = router
        .clone()
        .oneshot(anonymous(Method::DELETE, "/files/abc", "192.0.2.70"))
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_hardened(&unauthorized);

    for _ in 0..5 {
        router
            .clone()
            .oneshot(anonymous(Method::GET, "/", "192.0.2.71"))
            .await
            .unwrap();
    }
    let throttled = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/abc", "192.0.2.71"))
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_hardened(&throttled);
    assert_eq!(throttled.headers()[header::CONTENT_DISPOSITION], "attachment");
}

#[tokio::test]
async fn upload_downloads_are_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let (server, _delegate) = gate(test_config(dir.path()));
    let router = server.router();

    let download = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/24e533e02ec3bc40c387f1a0e460e216", "192.0.2.80"))
        .await
        .unwrap();
    assert_hardened(&download);
    assert_eq!(download.headers()[header::CONTENT_DISPOSITION], "attachment");

    let listing = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/", "192.0.2.80"))
        .await
        .unwrap();
    assert!(listing.headers().get(header::CONTENT_DISPOSITION).is_none());

    let head = router
        .clone()
        .oneshot(anonymous(Method::HEAD, "/files/abc", "192.0.2.80"))
        .await
        .unwrap();
    assert!(head.headers().get(header::CONTENT_DISPOSITION).is_none());
}

#[tokio::test]
async fn oversized_uploads_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.upload.max_size = 16;
    let (server, delegate) = gate(config);
    let router = server.router();

    let announced = request(Method::POST, "/files/", "192.0.2.90")
        .header("X-Auth-Token", TOKEN)
        .header("Upload-Length", "17")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(announced).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_hardened(&response);

    let at_limit = request(Method::POST, "/files/", "192.0.2.90")
        .header("X-Auth-Token", TOKEN)
        .header("Upload-Length", "16")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(at_limit).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let chunk = request(Method::PATCH, "/files/abc", "192.0.2.90")
        .header("X-Auth-Token", TOKEN)
        .header(header::CONTENT_LENGTH, "32")
        .body(Body::from(vec![0u8; 32]))
        .unwrap();
    let response = router.clone().oneshot(chunk).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_hardened(&response);
    // Refused by the size gate (and counted), not by the body limit layer.
    assert_eq!(body_string(response).await, "Payload Too Large");

    assert_eq!(delegate.count(), 1);
}

#[tokio::test]
async fn static_assets_share_the_gates() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(config.upload.static_dir.join("index.html"), "<h1>upload</h1>").unwrap();
    let (server, delegate) = gate(config);
    let router = server.router();

    let page = router
        .clone()
        .oneshot(anonymous(Method::GET, "/index.html", "192.0.2.100"))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    assert_hardened(&page);
    assert!(page.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert!(page.headers().contains_key("x-request-id"));
    assert_eq!(body_string(page).await, "<h1>upload</h1>");

    let root = router
        .clone()
        .oneshot(anonymous(Method::GET, "/", "192.0.2.100"))
        .await
        .unwrap();
    assert_eq!(root.status(), StatusCode::OK);

    let missing = router
        .clone()
        .oneshot(anonymous(Method::GET, "/nope.js", "192.0.2.100"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_hardened(&missing);

    let post = router
        .clone()
        .oneshot(anonymous(Method::POST, "/index.html", "192.0.2.101"))
        .await
        .unwrap();
    assert_eq!(post.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(delegate.count(), 0);
}

#[tokio::test]
async fn upload_routes_follow_the_configured_base_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.upload.base_path = "/uploads/".to_string();
    let (server, delegate) = gate(config);
    let router = server.router();

    let response = router
        .clone()
        .oneshot(anonymous(Method::GET, "/uploads/abc", "192.0.2.110"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "attachment");

    let response = router
        .clone()
        .oneshot(anonymous(Method::GET, "/files/abc", "192.0.2.110"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(delegate.calls(), vec![(Method::GET, "/uploads/abc".to_string())]);
}
