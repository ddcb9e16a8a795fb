//! API dispatch gateway.
//!
//! # Responsibilities
//! - Map a node path and verb under the API prefix to a registered handler
//! - Normalize handler output into the [`ApiResult`] envelope
//! - Render JSON, or JSONP when a `callback` is supplied, never cacheable
//!
//! # Design Decisions
//! - Handlers are registered explicitly at startup; no runtime introspection
//! - Handler outcomes are a closed set of variants, so "already handled" is a
//!   value rather than an error
//! - The request body is read once, only after a handler matched

pub mod builtin;
pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod registry;

pub use builtin::register_builtin_nodes;
pub use context::NodeContext;
pub use dispatch::{api_middleware, ApiGateway, Dispatch, DispatchError, DispatchHooks, JsonProfile};
pub use envelope::ApiResult;
pub use registry::{node_fn, FnNode, NodeError, NodeMethod, NodeRegistry, NodeReply};
