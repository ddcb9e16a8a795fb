//! Node registry: (node path, verb) to handler.
//!
//! # Responsibilities
//! - Hold handlers registered at startup
//! - Resolve a request's node path and verb, with the OPTIONS fallback
//!
//! # Design Decisions
//! - Immutable once the gateway is built; lookups are plain map reads
//! - Node paths are stored without leading or trailing slashes

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use super::context::NodeContext;
use super::envelope::ApiResult;

/// What a node produced.
pub enum NodeReply {
    /// A plain value; the gateway wraps it in a success envelope.
    Value(Value),
    /// A ready envelope, passed through as is.
    Envelope(ApiResult),
    /// The node built the whole response itself.
    Handled(Response),
}

impl From<Value> for NodeReply {
    fn from(value: Value) -> Self {
        NodeReply::Value(value)
    }
}

impl From<ApiResult> for NodeReply {
    fn from(envelope: ApiResult) -> Self {
        NodeReply::Envelope(envelope)
    }
}

impl From<Response> for NodeReply {
    fn from(response: Response) -> Self {
        NodeReply::Handled(response)
    }
}

/// Failures raised by node handlers.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Expected, domain-level failure. Becomes an error envelope verbatim.
    #[error("{message} (code {code})")]
    Method {
        code: i64,
        message: String,
        data: Value,
    },

    /// Anything else.
    #[error(transparent)]
    Internal(Box<dyn StdError + Send + Sync>),
}

impl NodeError {
    pub fn method(code: i64, message: impl Into<String>) -> Self {
        NodeError::Method {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn method_with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        NodeError::Method {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn internal(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        NodeError::Internal(error.into())
    }
}

/// A callable node.
pub trait NodeMethod: Send + Sync {
    /// Human-readable name, used in the default success message.
    fn name(&self) -> &str;

    fn invoke(&self, ctx: Arc<NodeContext>) -> BoxFuture<'static, Result<NodeReply, NodeError>>;
}

/// Adapter turning an async closure into a [`NodeMethod`].
pub struct FnNode<F> {
    name: String,
    handler: F,
}

pub fn node_fn<F, Fut, R>(name: impl Into<String>, handler: F) -> FnNode<F>
where
    F: Fn(Arc<NodeContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, NodeError>> + Send + 'static,
    R: Into<NodeReply> + Send + 'static,
{
    FnNode {
        name: name.into(),
        handler,
    }
}

impl<F, Fut, R> NodeMethod for FnNode<F>
where
    F: Fn(Arc<NodeContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, NodeError>> + Send + 'static,
    R: Into<NodeReply> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, ctx: Arc<NodeContext>) -> BoxFuture<'static, Result<NodeReply, NodeError>> {
        let fut = (self.handler)(ctx);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}

/// Handlers keyed by node path and verb.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<(String, Method), Arc<dyn NodeMethod>>,
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; a later registration for the same key replaces it.
    pub fn register(&mut self, path: &str, method: Method, node: impl NodeMethod + 'static) -> &mut Self {
        let path = normalize(path);
        tracing::debug!(node = %path, method = %method, "Node registered");
        self.nodes.insert((path, method), Arc::new(node));
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Exact lookup.
    pub fn get(&self, path: &str, method: &Method) -> Option<Arc<dyn NodeMethod>> {
        self.nodes.get(&(normalize(path), method.clone())).cloned()
    }

    /// Lookup with the pre-flight fallback: OPTIONS tries GET, then POST.
    pub fn resolve(&self, path: &str, method: &Method) -> Option<Arc<dyn NodeMethod>> {
        self.get(path, method).or_else(|| {
            if *method == Method::OPTIONS {
                self.get(path, &Method::GET)
                    .or_else(|| self.get(path, &Method::POST))
            } else {
                None
            }
        })
    }

    /// Registered (path, verb) pairs, sorted.
    pub fn routes(&self) -> Vec<(String, Method)> {
        let mut routes: Vec<_> = self.nodes.keys().cloned().collect();
        routes.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &'static str) -> impl NodeMethod {
        node_fn(name, |_ctx| async { Ok::<_, NodeError>(json!(null)) })
    }

    #[test]
    fn test_exact_lookup_normalizes_path() {
        let mut registry = NodeRegistry::new();
        registry.register("/user/list/", Method::GET, named("list users"));

        assert!(registry.get("user/list", &Method::GET).is_some());
        assert!(registry.get("user/list", &Method::POST).is_none());
        assert!(registry.get("user", &Method::GET).is_none());
    }

    #[test]
    fn test_options_falls_back_to_get_then_post() {
        let mut registry = NodeRegistry::new();
        registry
            .register("a", Method::GET, named("get a"))
            .register("a", Method::POST, named("post a"))
            .register("b", Method::POST, named("post b"));

        assert_eq!(registry.resolve("a", &Method::OPTIONS).unwrap().name(), "get a");
        assert_eq!(registry.resolve("b", &Method::OPTIONS).unwrap().name(), "post b");
        assert!(registry.resolve("b", &Method::GET).is_none());
        assert!(registry.resolve("c", &Method::OPTIONS).is_none());
    }

    #[test]
    fn test_routes_are_sorted() {
        let mut registry = NodeRegistry::new();
        registry
            .register("z", Method::GET, named("z"))
            .register("a", Method::POST, named("a"));
        let routes = registry.routes();
        assert_eq!(routes[0].0, "a");
        assert_eq!(routes[1].0, "z");
    }
}
