//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the upload gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Transport and delegate timeouts.
    pub timeouts: TimeoutConfig,

    /// Per-client admission policy.
    pub rate_limit: RateLimitConfig,

    /// Background eviction schedules.
    pub sweeper: SweeperConfig,

    /// Upload route, storage and delegate settings.
    pub upload: UploadConfig,

    /// Authorization and response header settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for the transport layer and the upload delegate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time a client has to deliver complete request headers.
    pub header_read_secs: u64,

    /// Keep-alive connections without an in-flight request are reclaimed after this.
    pub idle_secs: u64,

    /// Deadline for the upload delegate to start answering a forwarded request.
    pub upstream_secs: u64,
}

impl TimeoutConfig {
    pub fn header_read(&self) -> Duration {
        Duration::from_secs(self.header_read_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_read_secs: 5,
            idle_secs: 120,
            upstream_secs: 300,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable per-client admission control.
    pub enabled: bool,

    /// Steady-state refill rate (tokens per second per client).
    pub requests_per_second: f64,

    /// Bucket capacity (burst size).
    pub burst_size: u32,

    /// Derive the client identity from `client_ip_header` when present.
    ///
    /// Only safe when every request arrives through the fronting proxy that
    /// sets this header; otherwise clients can pick their own bucket.
    pub trust_proxy_header: bool,

    /// Header carrying the original client address.
    pub client_ip_header: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst_size: 5,
            trust_proxy_header: true,
            client_ip_header: "CF-Connecting-IP".to_string(),
        }
    }
}

/// Schedules for the background expiry sweeps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub visitor_sweep_interval_secs: u64,
    pub visitor_idle_secs: u64,
    pub file_sweep_interval_secs: u64,
    pub file_retention_secs: u64,
}

impl SweeperConfig {
    pub fn visitor_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.visitor_sweep_interval_secs)
    }

    pub fn visitor_idle(&self) -> Duration {
        Duration::from_secs(self.visitor_idle_secs)
    }

    pub fn file_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.file_sweep_interval_secs)
    }

    pub fn file_retention(&self) -> Duration {
        Duration::from_secs(self.file_retention_secs)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            visitor_sweep_interval_secs: 5 * 60,
            visitor_idle_secs: 10 * 60,
            file_sweep_interval_secs: 60 * 60,
            file_retention_secs: 24 * 60 * 60,
        }
    }
}

/// Upload route and storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Route prefix of the resumable-upload endpoint.
    pub base_path: String,

    /// Directory the upload server stores files in.
    pub storage_dir: PathBuf,

    /// Directory served on every other path.
    pub static_dir: PathBuf,

    /// Upload size ceiling in bytes.
    pub max_size: u64,

    /// Address of the resumable-upload server requests are delegated to.
    pub upstream_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_path: "/files/".to_string(),
            storage_dir: PathBuf::from("./uploads"),
            static_dir: PathBuf::from("./static"),
            max_size: 1024 * 1024 * 1024, // 1 GiB
            upstream_url: "http://127.0.0.1:1080".to_string(),
        }
    }
}

/// Authorization and response-hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Header carrying the shared upload token.
    pub auth_header: String,

    /// Environment variable the shared secret is read from.
    pub secret_env: String,

    /// Third-party origin allowed to serve scripts and styles.
    pub asset_origin: String,

    /// `Strict-Transport-Security` max-age.
    pub hsts_max_age_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            auth_header: "X-Auth-Token".to_string(),
            secret_env: "UPLOAD_SECRET".to_string(),
            asset_origin: "https://releases.transloadit.com".to_string(),
            hsts_max_age_secs: 31_536_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
