//! Upload delegate.
//!
//! The resumable-upload protocol and chunk storage live in an external
//! upload server. Requests that clear every gate are forwarded there
//! unchanged apart from connection-scoped headers and the forwarding
//! headers the upload server needs to build absolute `Location` URLs.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{
        header::HOST,
        uri::{Authority, Scheme},
        HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, Version,
    },
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::response::{rejection, strip_hop_by_hop};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("upstream URL scheme `{0}` is not supported, use http")]
    UnsupportedScheme(String),

    #[error("upstream URL has no host")]
    MissingHost,

    #[error("invalid upstream authority: {0}")]
    InvalidAuthority(#[from] axum::http::uri::InvalidUri),
}

/// Forwards requests to the upload server.
#[derive(Clone)]
pub struct UploadProxy {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    timeout: Duration,
}

impl UploadProxy {
    pub fn new(upstream_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let url = url::Url::parse(upstream_url)?;
        if url.scheme() != "http" {
            return Err(UpstreamError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(UpstreamError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => Authority::try_from(format!("{}:{}", host, port).as_str())?,
            None => Authority::try_from(host)?,
        };

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            authority,
            timeout,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Forward one request and stream the answer back.
    ///
    /// Transport failures become 502, a silent upstream 504; the cause is
    /// logged, never returned.
    pub async fn forward(&self, request: Request) -> Response {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = match Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
        {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build upstream URI");
                return rejection(StatusCode::BAD_REQUEST);
            }
        };

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        prepare_forward_headers(&mut parts.headers, peer);

        parts.uri = uri;
        // The pooled client speaks HTTP/1.1 to the upload server whatever
        // the client used.
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let upstream_request = Request::from_parts(parts, body);

        match tokio::time::timeout(self.timeout, self.client.request(upstream_request)).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::error!(
                    upstream = %self.authority,
                    method = %method,
                    error = %e,
                    "Upload delegate request failed"
                );
                rejection(StatusCode::BAD_GATEWAY)
            }
            Err(_) => {
                tracing::error!(
                    upstream = %self.authority,
                    method = %method,
                    timeout_secs = self.timeout.as_secs(),
                    "Upload delegate timed out"
                );
                rejection(StatusCode::GATEWAY_TIMEOUT)
            }
        }
    }
}

fn prepare_forward_headers(headers: &mut HeaderMap, peer: Option<IpAddr>) {
    strip_hop_by_hop(headers);

    if let Some(ip) = peer {
        let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(&X_FORWARDED_HOST) {
        if let Some(host) = headers.get(HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }

    // A TLS-terminating proxy in front of the gate sets its own value.
    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
}
