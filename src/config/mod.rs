//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → schema.rs apply_property (flat `key=value` overrides)
//!     → validation.rs (semantic checks)
//!     → PipelineConfig (validated, immutable)
//!     → shared via Arc to all stages
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; stages copy what they need at build time
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApiConfig, ListenerConfig, ObservabilityConfig, PipelineConfig, ResourceConfig, SessionConfig,
    TimeoutConfig,
};
