//! Request gate for a resumable upload endpoint.
//!
//! Every request passes per-client admission control, gets defensive
//! response headers, and (for mutating methods) a shared-token check
//! before reaching the upload delegate or the static asset directory.
//! Idle client state and expired uploads are swept in the background.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod sweeper;

pub use config::schema::GateConfig;
pub use http::GateServer;
pub use lifecycle::Shutdown;
