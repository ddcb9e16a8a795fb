//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use request_pipeline::api::{node_fn, ApiResult, NodeError, NodeRegistry};
use request_pipeline::config::PipelineConfig;
use request_pipeline::resource::MemoryProvider;
use request_pipeline::routing::ControllerRouter;
use request_pipeline::{HttpServer, Pipeline, PipelineParts, Shutdown};

pub const SITE_CSS: &str = "body { margin: 0 }";

/// Fixed last-modified time for every fixture resource.
pub fn modified() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.resources.suffix = Some(".html".to_string());
    config.resources.retry_base_delay_ms = 1;
    config
}

pub fn sample_provider() -> MemoryProvider {
    let provider = MemoryProvider::new();
    provider.insert("docs", "resource/site.css", SITE_CSS, modified());
    provider.insert("0", "index.html", "<h1>home</h1>", modified());
    provider
}

/// Nodes used across tests.
pub fn sample_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry
        .register("answer", Method::GET, node_fn("answer", |_ctx| async { Ok(json!(42)) }))
        .register(
            "object",
            Method::GET,
            node_fn("object", |_ctx| async { Ok(json!({ "x": 1 })) }),
        )
        .register(
            "validate",
            Method::POST,
            node_fn("validate", |_ctx| async {
                Err::<Value, _>(NodeError::method(1001, "bad input"))
            }),
        )
        .register(
            "prebuilt",
            Method::GET,
            node_fn("prebuilt", |_ctx| async {
                Ok(ApiResult::success("custom", json!([1, 2])).with_meta_info("page", 1))
            }),
        )
        .register(
            "greet",
            Method::POST,
            node_fn("greet", |ctx| async move {
                let name = ctx.form_value("name").unwrap_or("stranger").to_string();
                if let Some(session) = ctx.session() {
                    session.insert("greeted", json!(name));
                }
                Ok(json!(format!("hello {name} ({})", ctx.language())))
            }),
        )
        .register(
            "crash",
            Method::GET,
            node_fn("crash", |_ctx| async {
                Err::<Value, _>(NodeError::internal("storage unavailable"))
            }),
        );
    registry
}

pub fn sample_controllers() -> ControllerRouter {
    ControllerRouter::new()
        .route("/user/:id", |_req: Request<Body>, params: request_pipeline::routing::RouteParams| async move {
            format!("user {}", params.get("id").unwrap_or_default()).into_response()
        })
        .unwrap()
}

pub fn sample_parts() -> PipelineParts {
    PipelineParts {
        provider: Arc::new(sample_provider()),
        registry: sample_registry(),
        controllers: sample_controllers(),
        ..Default::default()
    }
}

/// Pipeline plus its router, for in-process requests.
pub fn build(config: &PipelineConfig, parts: PipelineParts) -> (Pipeline, Router) {
    let pipeline = Pipeline::new(config, parts).unwrap();
    let router = pipeline.router(config);
    (pipeline, router)
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_str(&body_string(response).await).unwrap()
}

/// `name=value` from the response's session cookie.
pub fn session_cookie(response: &Response) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

/// Bind an ephemeral port and serve until the returned `Shutdown` fires.
pub async fn start_server(
    config: PipelineConfig,
    parts: PipelineParts,
) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, parts).unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();

    let handle = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });
    (addr, shutdown, handle)
}
