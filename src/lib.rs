//! In-process HTTP request pipeline.
//!
//! Session continuity, conditional-GET resource serving and RPC-style API
//! dispatch, layered as axum middleware in front of controller routing.

pub mod api;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod resource;
pub mod routing;
pub mod session;

pub use config::PipelineConfig;
pub use http::{HttpServer, Pipeline, PipelineError, PipelineParts};
pub use lifecycle::Shutdown;
