//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! accepted connection
//!     → server.rs (hyper connection, header-read and idle bounds)
//!     → request.rs (x-request-id, trace span)
//!     → pipeline.rs (admission → headers → auth → route)
//!         /files/…  → upload limits → upstream.rs (resumable-upload server)
//!         otherwise → static assets
//!     → response.rs (fixed rejection bodies, hop-by-hop stripping)
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use pipeline::Pipeline;
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{GateServer, ServerError};
pub use upstream::{UploadProxy, UpstreamError};
