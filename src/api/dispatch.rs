//! API dispatch gateway.
//!
//! # Data Flow
//! ```text
//! /api/user/list?callback=cb
//!     → strip prefix → node path `user/list`
//!     → registry (path, verb), OPTIONS falls back to GET then POST
//!     → read body once → NodeContext
//!     → invoke hook → handler (timed) → return hook
//!     → Invocation { Envelope | AlreadyWritten | Failed }
//!     → JSON (or `cb(json)`) with no-cache headers
//! ```
//!
//! # Design Decisions
//! - Requests outside the prefix, or without a registered node, pass through untouched
//! - Domain failures become error envelopes; other failures go to the exception
//!   hook, or escape as [`DispatchError`] when none is installed
//! - A panicking handler is treated like any other unexpected failure

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::http::request::{query_value, request_id};
use crate::http::response::set_no_cache;
use crate::observability::metrics;

use super::context::NodeContext;
use super::envelope::ApiResult;
use super::registry::{NodeError, NodeMethod, NodeRegistry, NodeReply};

/// Query parameter naming the JSONP callback.
pub const CALLBACK_QUERY: &str = "callback";

/// Metadata key carrying the handler's wall time in milliseconds.
pub const USED_TIME_KEY: &str = "usedTime";

/// Error code for a request body that could not be read within the limit.
pub const BODY_TOO_LARGE_CODE: i64 = 413;

const JSON_MEDIA_TYPE: &str = "application/json; charset=utf-8";
const SCRIPT_MEDIA_TYPE: &str = "application/x-javascript";

pub type InvokeHook = Arc<dyn Fn(&NodeContext, Arc<dyn NodeMethod>) -> Arc<dyn NodeMethod> + Send + Sync>;
pub type ReturnHook = Arc<dyn Fn(&NodeContext, NodeReply) -> NodeReply + Send + Sync>;
pub type ExceptionHook = Arc<dyn Fn(&NodeContext, &NodeError) -> Value + Send + Sync>;

/// Optional interception points around a node call.
#[derive(Clone, Default)]
pub struct DispatchHooks {
    /// May substitute the handler before it runs.
    pub on_invoke: Option<InvokeHook>,
    /// May transform the handler's reply.
    pub on_return: Option<ReturnHook>,
    /// Turns an unexpected failure into the output payload.
    pub on_exception: Option<ExceptionHook>,
}

/// Serializer settings for dispatch output.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProfile {
    pub pretty: bool,
}

impl JsonProfile {
    fn to_string<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }
}

/// Failures that escape the gateway. The host answers them with a 500.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("node `{node}` failed and no exception hook is installed: {source}")]
    Unhandled {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error("failed to serialize the result of node `{node}`: {source}")]
    Serialize {
        node: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of offering a request to the gateway.
pub enum Dispatch {
    /// The gateway produced the response.
    Handled(Response),
    /// Not an API request; continue with the next stage.
    PassThrough(Request),
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }
}

enum Invocation {
    Envelope(ApiResult),
    AlreadyWritten(Response),
    Failed(NodeError),
}

#[derive(Serialize)]
#[serde(untagged)]
enum Payload {
    Envelope(ApiResult),
    Raw(Value),
}

pub struct ApiGateway {
    prefix: String,
    registry: NodeRegistry,
    hooks: DispatchHooks,
    profile: JsonProfile,
    max_body_bytes: usize,
    default_language: String,
}

impl ApiGateway {
    pub fn new(config: &ApiConfig, registry: NodeRegistry) -> Self {
        Self {
            prefix: config.path_prefix.clone(),
            registry,
            hooks: DispatchHooks::default(),
            profile: JsonProfile {
                pretty: config.pretty_json,
            },
            max_body_bytes: config.max_body_bytes,
            default_language: config.default_language.clone(),
        }
    }

    pub fn with_hooks(mut self, hooks: DispatchHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn on_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&NodeContext, Arc<dyn NodeMethod>) -> Arc<dyn NodeMethod> + Send + Sync + 'static,
    {
        self.hooks.on_invoke = Some(Arc::new(hook));
        self
    }

    pub fn on_return<F>(mut self, hook: F) -> Self
    where
        F: Fn(&NodeContext, NodeReply) -> NodeReply + Send + Sync + 'static,
    {
        self.hooks.on_return = Some(Arc::new(hook));
        self
    }

    pub fn on_exception<F>(mut self, hook: F) -> Self
    where
        F: Fn(&NodeContext, &NodeError) -> Value + Send + Sync + 'static,
    {
        self.hooks.on_exception = Some(Arc::new(hook));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Node path for a request path under the prefix, percent-decoded.
    pub fn node_path(&self, request_path: &str) -> Option<String> {
        let raw = request_path.strip_prefix(self.prefix.as_str())?;
        let decoded = urlencoding::decode(raw).ok()?;
        Some(decoded.trim_matches('/').to_string())
    }

    /// Offer a request to the gateway.
    pub async fn dispatch(&self, request: Request) -> Result<Dispatch, DispatchError> {
        let Some(node_path) = self.node_path(request.uri().path()) else {
            return Ok(Dispatch::PassThrough(request));
        };
        let Some(node) = self.registry.resolve(&node_path, request.method()) else {
            tracing::debug!(node = %node_path, method = %request.method(), "No node registered, passing on");
            return Ok(Dispatch::PassThrough(request));
        };

        let (parts, body) = request.into_parts();
        let request_id = request_id(&parts.headers);

        let body = match to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(request_id = %request_id, node = %node_path, error = %e, "Request body rejected");
                let envelope = ApiResult::error(BODY_TOO_LARGE_CODE, "request body too large or unreadable", Value::Null);
                let mut response = self.render(&parts.uri, &node_path, &Payload::Envelope(envelope))?;
                *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
                return Ok(Dispatch::Handled(response));
            }
        };

        let ctx = Arc::new(NodeContext::from_parts(&parts, node_path.clone(), body, &self.default_language));
        let node = match &self.hooks.on_invoke {
            Some(hook) => hook(&ctx, node),
            None => node,
        };

        let (invocation, elapsed) = self.invoke(&ctx, node.as_ref()).await;

        let payload = match invocation {
            Invocation::Envelope(envelope) => {
                let outcome = if envelope.success { "success" } else { "error" };
                metrics::record_dispatch(&node_path, outcome, elapsed);
                Payload::Envelope(envelope)
            }
            Invocation::AlreadyWritten(response) => {
                metrics::record_dispatch(&node_path, "handled", elapsed);
                tracing::debug!(request_id = %request_id, node = %node_path, "Node wrote its own response");
                return Ok(Dispatch::Handled(with_language_cookie(&ctx, response)));
            }
            Invocation::Failed(NodeError::Method { code, message, data }) => {
                metrics::record_dispatch(&node_path, "error", elapsed);
                tracing::info!(request_id = %request_id, node = %node_path, code, message = %message, "Node reported a failure");
                Payload::Envelope(ApiResult::error(code, message, data))
            }
            Invocation::Failed(error) => {
                metrics::record_dispatch(&node_path, "failed", elapsed);
                let Some(hook) = &self.hooks.on_exception else {
                    return Err(DispatchError::Unhandled {
                        node: node_path,
                        source: error,
                    });
                };
                tracing::warn!(request_id = %request_id, node = %node_path, error = %error, "Node failed, handing off to exception hook");
                Payload::Raw(hook(&ctx, &error))
            }
        };

        self.render(&parts.uri, &node_path, &payload)
            .map(|response| Dispatch::Handled(with_language_cookie(&ctx, response)))
    }

    async fn invoke(&self, ctx: &Arc<NodeContext>, node: &dyn NodeMethod) -> (Invocation, Duration) {
        let started = Instant::now();
        // Building the future runs handler code too, so it happens inside the guard.
        let outcome = AssertUnwindSafe(async { node.invoke(Arc::clone(ctx)).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(NodeError::internal("node handler panicked")));
        let elapsed = started.elapsed();

        let invocation = match outcome {
            Ok(reply) => {
                let reply = match &self.hooks.on_return {
                    Some(hook) => hook(ctx, reply),
                    None => reply,
                };
                match reply {
                    NodeReply::Value(data) => Invocation::Envelope(
                        ApiResult::success(format!("{} succeeded", node.name()), data)
                            .with_meta_info(USED_TIME_KEY, elapsed.as_secs_f64() * 1000.0),
                    ),
                    NodeReply::Envelope(envelope) => Invocation::Envelope(envelope),
                    NodeReply::Handled(response) => Invocation::AlreadyWritten(response),
                }
            }
            Err(error) => Invocation::Failed(error),
        };
        (invocation, elapsed)
    }

    fn render(&self, uri: &Uri, node_path: &str, payload: &Payload) -> Result<Response, DispatchError> {
        let json = self
            .profile
            .to_string(payload)
            .map_err(|source| DispatchError::Serialize {
                node: node_path.to_string(),
                source,
            })?;

        let (body, media_type) = match query_value(uri, CALLBACK_QUERY).filter(|cb| !cb.is_empty()) {
            Some(callback) => (format!("{callback}({json})"), SCRIPT_MEDIA_TYPE),
            None => (json, JSON_MEDIA_TYPE),
        };

        let mut response = Response::new(Body::from(body));
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
        set_no_cache(headers);
        Ok(response)
    }
}

fn with_language_cookie(ctx: &NodeContext, mut response: Response) -> Response {
    if let Some(cookie) = ctx.language_cookie() {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// Pipeline stage: dispatch API requests or fall through.
pub async fn api_middleware(
    State(gateway): State<Arc<ApiGateway>>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = request_id(request.headers());
    match gateway.dispatch(request).await {
        Ok(Dispatch::Handled(response)) => response,
        Ok(Dispatch::PassThrough(request)) => next.run(request).await,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Unhandled node failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::registry::node_fn;
    use axum::http::Method;
    use serde_json::json;

    fn gateway(registry: NodeRegistry) -> ApiGateway {
        ApiGateway::new(&ApiConfig::default(), registry)
    }

    fn request(method: Method, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn handled(dispatch: Result<Dispatch, DispatchError>) -> Response {
        match dispatch {
            Ok(Dispatch::Handled(response)) => response,
            Ok(Dispatch::PassThrough(_)) => panic!("request passed through"),
            Err(e) => panic!("dispatch failed: {e}"),
        }
    }

    #[test]
    fn test_node_path() {
        let gateway = gateway(NodeRegistry::new());
        assert_eq!(gateway.node_path("/api/user/list"), Some("user/list".to_string()));
        assert_eq!(gateway.node_path("/api/a%20b/"), Some("a b".to_string()));
        assert_eq!(gateway.node_path("/apix/user"), None);
        assert_eq!(gateway.node_path("/static/x"), None);
    }

    #[tokio::test]
    async fn test_plain_value_is_wrapped() {
        let mut registry = NodeRegistry::new();
        registry.register("answer", Method::GET, node_fn("answer", |_ctx| async { Ok(json!(42)) }));

        let response = handled(gateway(registry).dispatch(request(Method::GET, "/api/answer")).await).await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], JSON_MEDIA_TYPE);
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");

        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], 42);
        assert_eq!(body["message"], "answer succeeded");
        assert!(body["metaInfo"][USED_TIME_KEY].is_number());
    }

    #[tokio::test]
    async fn test_unregistered_passes_through() {
        let gateway = gateway(NodeRegistry::new());
        let dispatch = gateway.dispatch(request(Method::GET, "/api/nothing")).await.unwrap();
        assert!(!dispatch.is_handled());
        let dispatch = gateway.dispatch(request(Method::GET, "/index.html")).await.unwrap();
        assert!(!dispatch.is_handled());
    }

    #[tokio::test]
    async fn test_unhandled_failure_escapes_without_hook() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "boom",
            Method::GET,
            node_fn("boom", |_ctx| async { Err::<Value, _>(NodeError::internal("disk on fire")) }),
        );

        let result = gateway(registry.clone()).dispatch(request(Method::GET, "/api/boom")).await;
        assert!(matches!(result, Err(DispatchError::Unhandled { .. })));

        let hooked = gateway(registry).on_exception(|ctx, error| {
            json!({ "node": ctx.node_path(), "error": error.to_string() })
        });
        let response = handled(hooked.dispatch(request(Method::GET, "/api/boom")).await).await;
        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body, json!({ "node": "boom", "error": "disk on fire" }));
    }

    #[tokio::test]
    async fn test_panic_is_an_unexpected_failure() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "panic",
            Method::GET,
            node_fn("panic", |ctx| async move {
                if ctx.node_path() == "panic" {
                    panic!("handler bug");
                }
                Ok(json!(null))
            }),
        );
        let result = gateway(registry).dispatch(request(Method::GET, "/api/panic")).await;
        assert!(matches!(result, Err(DispatchError::Unhandled { .. })));
    }

    #[tokio::test]
    async fn test_panic_before_future_reaches_exception_hook() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "sync",
            Method::GET,
            node_fn("sync", |ctx: Arc<NodeContext>| {
                if ctx.node_path() == "sync" {
                    panic!("sync handler bug");
                }
                async { Ok(json!(1)) }
            }),
        );

        let result = gateway(registry.clone()).dispatch(request(Method::GET, "/api/sync")).await;
        assert!(matches!(result, Err(DispatchError::Unhandled { .. })));

        let hooked = gateway(registry).on_exception(|_ctx, error| json!({ "error": error.to_string() }));
        let response = handled(hooked.dispatch(request(Method::GET, "/api/sync")).await).await;
        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body, json!({ "error": "node handler panicked" }));
    }

    #[tokio::test]
    async fn test_chosen_language_is_sent_as_cookie() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "language",
            Method::POST,
            node_fn("language", |ctx| async move {
                ctx.set_language("fr-FR");
                Ok(json!(true))
            }),
        );
        registry.register("answer", Method::GET, node_fn("answer", |_ctx| async { Ok(json!(42)) }));
        let gateway = gateway(registry);

        let response = handled(gateway.dispatch(request(Method::POST, "/api/language")).await).await;
        assert_eq!(response.headers()[header::SET_COOKIE], "Accept-Language=fr-FR; Path=/");

        let response = handled(gateway.dispatch(request(Method::GET, "/api/answer")).await).await;
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_hooks_substitute_and_transform() {
        let mut registry = NodeRegistry::new();
        registry.register("n", Method::GET, node_fn("original", |_ctx| async { Ok(json!("original")) }));

        let gateway = gateway(registry)
            .on_invoke(|_ctx, _node| {
                let replacement: Arc<dyn NodeMethod> =
                    Arc::new(node_fn("replacement", |_ctx| async { Ok(json!(1)) }));
                replacement
            })
            .on_return(|_ctx, reply| match reply {
                NodeReply::Value(Value::Number(n)) => {
                    NodeReply::Value(json!(n.as_i64().unwrap_or_default() + 1))
                }
                other => other,
            });

        let response = handled(gateway.dispatch(request(Method::GET, "/api/n")).await).await;
        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body["data"], 2);
        assert_eq!(body["message"], "replacement succeeded");
    }

    #[tokio::test]
    async fn test_already_written_response_is_untouched() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "raw",
            Method::GET,
            node_fn("raw", |_ctx| async { Ok((StatusCode::ACCEPTED, "raw").into_response()) }),
        );

        let response = handled(gateway(registry).dispatch(request(Method::GET, "/api/raw?callback=cb")).await).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().get(header::PRAGMA).is_none());
        assert_eq!(body_of(response).await, "raw");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut registry = NodeRegistry::new();
        registry.register("echo", Method::POST, node_fn("echo", |ctx| async move {
            Ok(json!(ctx.body().len()))
        }));
        let config = ApiConfig {
            max_body_bytes: 4,
            ..Default::default()
        };
        let gateway = ApiGateway::new(&config, registry);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .body(Body::from("too long"))
            .unwrap();

        let response = handled(gateway.dispatch(request).await).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body["code"], BODY_TOO_LARGE_CODE);
    }
}
