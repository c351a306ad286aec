//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_rejected_total{reason}` (counter): `rate_limit`, `unauthorized`, `too_large`
//! - `gate_tracked_clients` (gauge): visitors currently held by the registry
//! - `gate_visitors_evicted_total` (counter)
//! - `gate_files_expired_total` (counter)

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RateLimit,
    Unauthorized,
    TooLarge,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::RateLimit => "rate_limit",
            RejectReason::Unauthorized => "unauthorized",
            RejectReason::TooLarge => "too_large",
        }
    }
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_rejection(reason: RejectReason) {
    ::metrics::counter!("gate_requests_rejected_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_tracked_clients(count: usize) {
    ::metrics::gauge!("gate_tracked_clients").set(count as f64);
}

pub fn record_visitors_evicted(count: usize) {
    ::metrics::counter!("gate_visitors_evicted_total").increment(count as u64);
}

pub fn record_file_expired() {
    ::metrics::counter!("gate_files_expired_total").increment(1);
}
