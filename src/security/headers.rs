//! Defensive response headers.
//!
//! Every response leaving the gate gets the same fixed set of headers,
//! whatever produced it (delegate, static files, or a gate rejection).
//! Uploaded content fetched back through the upload route is forced to
//! download instead of rendering inline.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{
            CONTENT_DISPOSITION, CONTENT_SECURITY_POLICY, REFERRER_POLICY,
            STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
        header::InvalidHeaderValue,
        HeaderMap, HeaderName, HeaderValue, Method,
    },
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;

/// CSP allowing same-origin content plus scripts and styles from `asset_origin`.
pub fn content_security_policy(asset_origin: &str) -> String {
    format!(
        "default-src 'self'; script-src 'self' {origin}; style-src 'self' {origin} 'unsafe-inline'; \
         img-src 'self' data:; object-src 'none'; base-uri 'none';",
        origin = asset_origin
    )
}

#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    fixed: Vec<(HeaderName, HeaderValue)>,
    upload_prefix: String,
}

impl SecurityHeaders {
    pub fn new(config: &SecurityConfig, upload_prefix: &str) -> Result<Self, InvalidHeaderValue> {
        let hsts = format!("max-age={}; includeSubDomains", config.hsts_max_age_secs);
        let csp = content_security_policy(&config.asset_origin);

        let fixed = vec![
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (STRICT_TRANSPORT_SECURITY, HeaderValue::from_str(&hsts)?),
            (REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
            (CONTENT_SECURITY_POLICY, HeaderValue::from_str(&csp)?),
        ];

        Ok(Self {
            fixed,
            upload_prefix: upload_prefix.to_string(),
        })
    }

    /// Set the defensive headers on `headers`, replacing any existing values.
    /// Applying this more than once changes nothing.
    pub fn decorate(&self, method: &Method, path: &str, headers: &mut HeaderMap) {
        for (name, value) in &self.fixed {
            headers.insert(name.clone(), value.clone());
        }

        if method == Method::GET && self.serves_upload(path) {
            headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
        }
    }

    /// True for paths naming a resource below the upload prefix, not the
    /// prefix itself.
    fn serves_upload(&self, path: &str) -> bool {
        path.strip_prefix(&self.upload_prefix)
            .is_some_and(|rest| !rest.is_empty())
    }
}

pub async fn security_headers_middleware(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    headers.decorate(&method, &path, response.headers_mut());
    response
}
