//! HTTP hosting and shared header helpers.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request id, trace span, timeout)
//!     → session stage → resource stage → API stage → controller routing
//!     → response.rs helpers (extra headers, no-cache) used by the stages
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{HttpServer, Pipeline, PipelineError, PipelineParts};
