//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, pretty or JSON)
//!     → metrics.rs (rejection counters, registry gauge, sweep counters)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Rejections are expected traffic: counted, logged below error level
//! - Secret material never appears in a log field
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
