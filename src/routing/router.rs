//! Controller routing: the last stage of the pipeline.
//!
//! # Responsibilities
//! - Store compiled controller routes
//! - Look up the first route whose pattern matches the request path
//! - Return 404 when nothing matches
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) pattern scan in registration order; first match wins
//! - Explicit NoMatch rather than silent default

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;

use crate::routing::matcher::{RouteError, RouteParams, RoutePattern};

/// A request handler bound to a route template.
pub trait Controller: Send + Sync {
    fn handle(&self, request: Request<Body>, params: RouteParams) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Controller for F
where
    F: Fn(Request<Body>, RouteParams) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, request: Request<Body>, params: RouteParams) -> BoxFuture<'static, Response> {
        Box::pin(self(request, params))
    }
}

/// Ordered table of controller routes.
#[derive(Clone, Default)]
pub struct ControllerRouter {
    routes: Vec<(RoutePattern, Arc<dyn Controller>)>,
}

impl ControllerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller; the template is compiled immediately.
    pub fn route<C>(mut self, template: &str, controller: C) -> Result<Self, RouteError>
    where
        C: Controller + 'static,
    {
        let pattern = RoutePattern::compile(template)?;
        tracing::debug!(template = %template, "Controller route registered");
        self.routes.push((pattern, Arc::new(controller)));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the controller for a path.
    pub fn find(&self, path: &str) -> Option<(Arc<dyn Controller>, RouteParams)> {
        self.routes.iter().find_map(|(pattern, controller)| {
            pattern
                .captures(path)
                .map(|params| (controller.clone(), params))
        })
    }

    /// Run the matching controller, or answer 404.
    pub async fn dispatch(&self, mut request: Request<Body>) -> Response {
        let path = request.uri().path().to_string();
        match self.find(&path) {
            Some((controller, params)) => {
                request.extensions_mut().insert(params.clone());
                controller.handle(request, params).await
            }
            None => {
                tracing::debug!(path = %path, "No controller matched");
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
        }
    }
}
