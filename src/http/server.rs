//! HTTP server setup.
//!
//! # Responsibilities
//! - Assemble the pipeline stages into one axum `Router`
//! - Wire up cross-cutting layers (request id, tracing, timeout)
//! - Run the session sweeper alongside the server and stop both on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::Request as HttpRequest,
    middleware::from_fn_with_state,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::{api_middleware, register_builtin_nodes, ApiGateway, DispatchHooks, NodeRegistry};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, PipelineConfig};
use crate::http::request::request_id;
use crate::lifecycle::Shutdown;
use crate::resource::{resource_middleware, CompositeProvider, ResourceGateway, ResourceProvider};
use crate::routing::{ControllerRouter, RouteError};
use crate::session::{session_middleware, SessionState, SessionStore};

/// Failures assembling the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Application-supplied collaborators.
pub struct PipelineParts {
    pub provider: Arc<dyn ResourceProvider>,
    pub registry: NodeRegistry,
    pub controllers: ControllerRouter,
    pub hooks: DispatchHooks,
}

impl Default for PipelineParts {
    fn default() -> Self {
        Self {
            provider: Arc::new(CompositeProvider::new()),
            registry: NodeRegistry::new(),
            controllers: ControllerRouter::new(),
            hooks: DispatchHooks::default(),
        }
    }
}

/// The four stages, shared read-only across requests (the session table aside).
#[derive(Clone)]
pub struct Pipeline {
    pub sessions: Arc<SessionStore>,
    pub resources: Arc<ResourceGateway>,
    pub api: Arc<ApiGateway>,
    pub controllers: Arc<ControllerRouter>,
}

impl Pipeline {
    /// Build the stages. The config is validated here as well, since it may
    /// not have come through the loader.
    pub fn new(config: &PipelineConfig, parts: PipelineParts) -> Result<Self, PipelineError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let sessions = Arc::new(SessionStore::new(&config.session));

        let mut registry = parts.registry;
        register_builtin_nodes(&mut registry, Arc::clone(&sessions));

        let resources = Arc::new(ResourceGateway::new(&config.resources, parts.provider)?);
        let api = Arc::new(ApiGateway::new(&config.api, registry).with_hooks(parts.hooks));

        Ok(Self {
            sessions,
            resources,
            api,
            controllers: Arc::new(parts.controllers),
        })
    }

    /// Session → resources → API → controllers, inside the cross-cutting layers.
    #[allow(deprecated)]
    pub fn router(&self, config: &PipelineConfig) -> Router {
        let controllers = Arc::clone(&self.controllers);
        let session_state = SessionState::new(Arc::clone(&self.sessions), &config.session);

        Router::new()
            .fallback(move |request: Request| {
                let controllers = Arc::clone(&controllers);
                async move { controllers.dispatch(request).await }
            })
            .layer(from_fn_with_state(Arc::clone(&self.api), api_middleware))
            .layer(from_fn_with_state(Arc::clone(&self.resources), resource_middleware))
            .layer(from_fn_with_state(session_state, session_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}

/// HTTP server hosting the pipeline.
pub struct HttpServer {
    router: Router,
    pipeline: Pipeline,
    config: PipelineConfig,
}

impl HttpServer {
    pub fn new(config: PipelineConfig, parts: PipelineParts) -> Result<Self, PipelineError> {
        let pipeline = Pipeline::new(&config, parts)?;
        let router = pipeline.router(&config);
        Ok(Self {
            router,
            pipeline,
            config,
        })
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then stop the sweeper.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let sweeper = self.pipeline.sessions.spawn_sweeper(shutdown.subscribe());

        tracing::info!(
            address = %addr,
            api_prefix = %self.pipeline.api.prefix(),
            nodes = self.pipeline.api.registry().len(),
            controllers = self.pipeline.controllers.len(),
            "HTTP server starting"
        );

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await;

        shutdown.trigger();
        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Session sweeper ended abnormally");
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
