//! Session middleware: first stage of the pipeline.
//!
//! Correlates the request with a session (query parameter beats cookie), exposes
//! the record to later stages through request extensions, and stamps the session
//! cookie plus the configured extra headers on the way out.

use std::ops::Deref;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::SET_COOKIE, request::Parts, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::SessionConfig;
use crate::http::request::{cookie_value, query_value};
use crate::http::response::ExtraHeaders;
use crate::session::store::{Session, SessionStore};

/// Query parameter that overrides the session cookie.
pub const SESSION_ID_QUERY: &str = "SessionId";

/// The active request's session, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct SessionHandle(pub Arc<Session>);

impl Deref for SessionHandle {
    type Target = Session;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session middleware not installed"))
    }
}

/// State required by the session middleware.
#[derive(Clone)]
pub struct SessionState {
    pub store: Arc<SessionStore>,
    pub id_key: Arc<str>,
    pub extra_headers: Arc<ExtraHeaders>,
}

impl SessionState {
    pub fn new(store: Arc<SessionStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            id_key: Arc::from(config.id_key.as_str()),
            extra_headers: Arc::new(ExtraHeaders::parse(&config.extra_headers)),
        }
    }
}

/// Session id supplied by the client: `SessionId` query parameter first, then cookie.
pub fn supplied_session_id<B>(request: &Request<B>, id_key: &str) -> Option<String> {
    query_value(request.uri(), SESSION_ID_QUERY)
        .filter(|id| !id.is_empty())
        .or_else(|| cookie_value(request.headers(), id_key).filter(|id| !id.is_empty()))
}

pub async fn session_middleware(
    State(state): State<SessionState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let supplied = supplied_session_id(&request, &state.id_key);
    let resolution = state.store.resolve_or_create(supplied.as_deref());
    let session = resolution.session;

    if resolution.created && supplied.is_some() {
        tracing::debug!(session_id = %session.id(), "Supplied session id was stale, issued a new one");
    }

    request.extensions_mut().insert(SessionHandle(session.clone()));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    state.extra_headers.apply_missing(headers);

    let cookie = format!("{}={}; Path=/; HttpOnly", state.id_key, session.id());
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(_) => tracing::warn!(id_key = %state.id_key, "Session cookie is not a valid header value"),
    }

    response
}
