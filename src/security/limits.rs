//! Upload size ceiling.
//!
//! Creation requests announce the final size in `Upload-Length` and chunks
//! carry a `Content-Length`; either above the ceiling is refused here, before
//! the delegate sees the request. Bodies without a declared length are
//! capped by tower-http's body limit layer, installed inside this check on
//! the upload route, and surface to the delegate as a body read error.

use axum::{
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::rejection;
use crate::observability::metrics::{self, RejectReason};

pub const UPLOAD_LENGTH: HeaderName = HeaderName::from_static("upload-length");

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_size: u64,
}

impl UploadLimits {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    /// Body limit for a single request, saturating on narrow targets.
    pub fn max_body(&self) -> usize {
        usize::try_from(self.max_size).unwrap_or(usize::MAX)
    }

    /// True when the announced upload size or the declared body length is
    /// above the ceiling. Missing or unparsable values are left to the
    /// delegate.
    pub fn exceeds(&self, headers: &HeaderMap) -> bool {
        [UPLOAD_LENGTH, CONTENT_LENGTH].iter().any(|name| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .is_some_and(|length| length > self.max_size)
        })
    }
}

pub async fn upload_limits_middleware(
    State(limits): State<UploadLimits>,
    request: Request,
    next: Next,
) -> Response {
    if limits.exceeds(request.headers()) {
        tracing::info!(
            path = %request.uri().path(),
            max_size = limits.max_size,
            "Rejected upload above size ceiling"
        );
        metrics::record_rejection(RejectReason::TooLarge);
        return rejection(StatusCode::PAYLOAD_TOO_LARGE);
    }
    next.run(request).await
}
