//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and that the
//! strings which become header names, header values and addresses parse.
//! Every problem is reported, not just the first.

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};

use crate::config::schema::GateConfig;
use crate::security::headers::content_security_policy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    MaxConnections,

    #[error("rate_limit.requests_per_second must be a positive number")]
    RefillRate,

    #[error("rate_limit.burst_size must be at least 1")]
    BurstSize,

    #[error("{field} `{value}` is not a valid header name")]
    HeaderName { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("upload.base_path `{0}` must start and end with '/' and name a route")]
    BasePath(String),

    #[error("upload.max_size must be greater than zero")]
    MaxSize,

    #[error("upload.upstream_url `{0}` is not an http:// URL with a host")]
    UpstreamUrl(String),

    #[error("security.asset_origin `{0}` cannot be used in a Content-Security-Policy")]
    AssetOrigin(String),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    let rate = &config.rate_limit;
    if !(rate.requests_per_second.is_finite() && rate.requests_per_second > 0.0) {
        errors.push(ValidationError::RefillRate);
    }
    if rate.burst_size == 0 {
        errors.push(ValidationError::BurstSize);
    }
    check_header_name(&mut errors, "rate_limit.client_ip_header", &rate.client_ip_header);
    check_header_name(&mut errors, "security.auth_header", &config.security.auth_header);

    let durations = [
        ("timeouts.header_read_secs", config.timeouts.header_read_secs),
        ("timeouts.idle_secs", config.timeouts.idle_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("sweeper.visitor_sweep_interval_secs", config.sweeper.visitor_sweep_interval_secs),
        ("sweeper.visitor_idle_secs", config.sweeper.visitor_idle_secs),
        ("sweeper.file_sweep_interval_secs", config.sweeper.file_sweep_interval_secs),
        ("sweeper.file_retention_secs", config.sweeper.file_retention_secs),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(field));
        }
    }

    let base = &config.upload.base_path;
    if base.len() < 2 || !base.starts_with('/') || !base.ends_with('/') {
        errors.push(ValidationError::BasePath(base.clone()));
    }
    if config.upload.max_size == 0 {
        errors.push(ValidationError::MaxSize);
    }
    let upstream_ok = url::Url::parse(&config.upload.upstream_url)
        .map(|url| url.scheme() == "http" && url.host_str().is_some())
        .unwrap_or(false);
    if !upstream_ok {
        errors.push(ValidationError::UpstreamUrl(config.upload.upstream_url.clone()));
    }

    let origin = &config.security.asset_origin;
    let origin_ok = url::Url::parse(origin).is_ok()
        && HeaderValue::from_str(&content_security_policy(origin)).is_ok();
    if !origin_ok {
        errors.push(ValidationError::AssetOrigin(origin.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_header_name(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if HeaderName::from_bytes(value.as_bytes()).is_err() {
        errors.push(ValidationError::HeaderName {
            field,
            value: value.to_string(),
        });
    }
}
