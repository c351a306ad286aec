//! Client identity derivation.
//!
//! The identity is only a map key for admission state. A configured proxy
//! header wins over the peer address; the header is trusted as-is, so the
//! gate must only be reachable through the proxy that sets it.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};

#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    proxy_header: Option<HeaderName>,
}

impl IdentityResolver {
    pub fn new(proxy_header: Option<HeaderName>) -> Self {
        Self { proxy_header }
    }

    /// Identity for a request.
    ///
    /// Falls back to the peer IP (port stripped). When neither is available
    /// the empty string is returned and all such clients share one bucket.
    pub fn resolve<B>(&self, request: &Request<B>) -> String {
        let forwarded = self
            .proxy_header
            .as_ref()
            .and_then(|name| request.headers().get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(client) = forwarded {
            return client.to_string();
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default()
    }
}
