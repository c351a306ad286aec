//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file (--config)
//!     → loader.rs (parse & deserialize, defaults for missing sections)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!
//! environment (UPLOAD_SECRET)
//!     → loader.rs (Secret::from_env, blank is fatal)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults matching the production policy constants
//! - The shared secret never lives in the config file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, Secret};
pub use schema::{
    GateConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, SecurityConfig,
    SweeperConfig, TimeoutConfig, UploadConfig,
};
pub use validation::{validate_config, ValidationError};
