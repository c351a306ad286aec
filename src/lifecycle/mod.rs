//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Resolve secret → Prepare storage → Start sweepers → Accept
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop stops → connections drain → sweepers exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: a missing secret or unusable delegate aborts startup
//! - One shutdown flag observed by every long-running task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
