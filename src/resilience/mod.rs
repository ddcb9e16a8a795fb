//! Resilience helpers.
//!
//! # Design Decisions
//! - Retries are bounded and local to one call; nothing retries indefinitely
//! - Jittered backoff avoids synchronized retries across concurrent requests
//! - Only errors the caller marks transient are retried

pub mod backoff;

pub use backoff::{calculate_backoff, retry_bounded};
