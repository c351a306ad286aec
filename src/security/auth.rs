//! Shared-secret authorization for mutating requests.
//!
//! Reads pass freely. Creating, appending to or deleting uploads requires
//! the configured token, compared in constant time.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::Secret;
use crate::http::response::rejection;
use crate::observability::metrics::{self, RejectReason};

/// Resumable-upload servers let clients tunnel PATCH/DELETE through this header.
pub const METHOD_OVERRIDE: HeaderName = HeaderName::from_static("x-http-method-override");

/// Methods with create/modify/delete semantics.
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Method named by the override header, if present and parseable.
pub fn override_method(headers: &HeaderMap) -> Option<Method> {
    headers
        .get(METHOD_OVERRIDE)
        .and_then(|value| Method::from_bytes(value.as_bytes()).ok())
}

/// The method authorization is judged on. An override can only escalate:
/// a mutating override wins, a read-only one never masks a mutating
/// request method.
pub fn gated_method(method: &Method, headers: &HeaderMap) -> Method {
    match override_method(headers) {
        Some(tunneled) if is_mutating(&tunneled) => tunneled,
        _ => method.clone(),
    }
}

/// Equality whose running time does not depend on where the inputs differ.
pub fn constant_time_eq(supplied: &[u8], expected: &[u8]) -> bool {
    // Pad both to the same length with different fill bytes; the length
    // check is folded in without branching on content.
    let len = supplied.len().max(expected.len());
    let mut a = vec![0u8; len];
    let mut b = vec![0xFFu8; len];
    a[..supplied.len()].copy_from_slice(supplied);
    b[..expected.len()].copy_from_slice(expected);

    let lengths_equal = supplied.len().ct_eq(&expected.len());
    let contents_equal = a.ct_eq(&b);
    (lengths_equal & contents_equal).into()
}

/// Whether a request with `method` and `supplied` token may proceed.
pub fn authorize(method: &Method, supplied: &[u8], expected: &Secret) -> bool {
    if !is_mutating(method) {
        return true;
    }
    constant_time_eq(supplied, expected.expose().as_bytes())
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    header: HeaderName,
    secret: Secret,
}

impl AuthGate {
    pub fn new(header: HeaderName, secret: Secret) -> Self {
        Self { header, secret }
    }

    pub fn check<B>(&self, request: &Request<B>) -> bool {
        let method = gated_method(request.method(), request.headers());
        let supplied = request
            .headers()
            .get(&self.header)
            .map(|value| value.as_bytes())
            .unwrap_or_default();
        authorize(&method, supplied, &self.secret)
    }
}

/// Last gate before the delegate. Failures never reach it.
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.check(&request) {
        return next.run(request).await;
    }

    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "Rejected unauthorized request"
    );
    metrics::record_rejection(RejectReason::Unauthorized);
    rejection(StatusCode::UNAUTHORIZED)
}
