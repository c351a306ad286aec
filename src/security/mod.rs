//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (proxy header, else peer IP)
//!     → rate_limit.rs (per-client token bucket; 429 on exhaustion)
//!     → headers.rs (defensive response headers, never rejects)
//!     → auth.rs (constant-time token check for mutating methods; 401)
//!     → limits.rs (upload size ceiling; 413, upload route only)
//!     → delegate
//! ```
//!
//! # Design Decisions
//! - Cheapest rejection first: admission runs before any other work
//! - Header injection wraps authorization, so 401s carry the headers too
//! - All checks are in-memory and bounded; none block on I/O

pub mod auth;
pub mod headers;
pub mod identity;
pub mod limits;
pub mod rate_limit;

pub use auth::{authorize, AuthGate};
pub use headers::SecurityHeaders;
pub use identity::IdentityResolver;
pub use limits::UploadLimits;
pub use rate_limit::{AdmissionLimiter, ClientRegistry, RateLimitPolicy, TokenBucket, VisitorState};
