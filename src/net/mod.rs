//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection cap)
//!     → connection.rs (tracking, per-connection idle bookkeeping)
//!     → hand off to the HTTP layer (header-read timeout applied there)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection is tracked so shutdown can wait for draining
//! - Idle means "no request in flight", not "no bytes moving"

pub mod connection;
pub mod listener;

pub use connection::{ConnectionActivity, ConnectionGuard, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
