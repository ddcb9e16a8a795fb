//! Nodes every deployment gets: a status probe and session introspection.

use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;
use serde_json::{json, Value};

use crate::session::SessionStore;

use super::registry::{node_fn, NodeError, NodeRegistry};

/// Error code returned when a node needs a session and none is attached.
pub const NO_SESSION_CODE: i64 = 401;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub sessions: usize,
}

/// Register `system/status` (GET) and `session` (GET, DELETE).
pub fn register_builtin_nodes(registry: &mut NodeRegistry, store: Arc<SessionStore>) {
    let status_store = Arc::clone(&store);
    registry.register(
        "system/status",
        Method::GET,
        node_fn("system status", move |_ctx| {
            let status = SystemStatus {
                version: env!("CARGO_PKG_VERSION"),
                status: "operational",
                sessions: status_store.len(),
            };
            async move { serde_json::to_value(status).map_err(NodeError::internal) }
        }),
    );

    registry.register(
        "session",
        Method::GET,
        node_fn("session info", |ctx| async move {
            let session = ctx
                .session()
                .ok_or_else(|| NodeError::method(NO_SESSION_CODE, "no active session"))?;
            Ok::<Value, NodeError>(json!({
                "id": session.id(),
                "keys": session.keys(),
                "expiresAt": session.expires_at().to_rfc3339(),
            }))
        }),
    );

    registry.register(
        "session",
        Method::DELETE,
        node_fn("session clear", move |ctx| {
            let store = Arc::clone(&store);
            async move {
                let session = ctx
                    .session()
                    .ok_or_else(|| NodeError::method(NO_SESSION_CODE, "no active session"))?;
                let cleared = store.clear(session);
                Ok::<Value, NodeError>(json!({ "cleared": cleared }))
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::NodeContext;
    use crate::api::registry::NodeReply;
    use crate::session::SessionHandle;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use std::time::Duration;

    fn setup() -> (NodeRegistry, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::with_ttl(Duration::from_secs(60), Duration::from_secs(10)));
        let mut registry = NodeRegistry::new();
        register_builtin_nodes(&mut registry, Arc::clone(&store));
        (registry, store)
    }

    fn ctx(method: Method, path: &str, session: Option<SessionHandle>) -> Arc<NodeContext> {
        let ctx = NodeContext::new(method, "/api/x".parse().unwrap(), HeaderMap::new(), path, Bytes::new());
        Arc::new(match session {
            Some(session) => ctx.with_session(session),
            None => ctx,
        })
    }

    fn value_of(reply: NodeReply) -> Value {
        match reply {
            NodeReply::Value(value) => value,
            _ => panic!("expected a plain value"),
        }
    }

    #[tokio::test]
    async fn test_status_counts_sessions() {
        let (registry, store) = setup();
        store.resolve_or_create(None);

        let node = registry.get("system/status", &Method::GET).unwrap();
        let reply = node.invoke(ctx(Method::GET, "system/status", None)).await.unwrap();
        let value = value_of(reply);
        assert_eq!(value["status"], "operational");
        assert_eq!(value["sessions"], 1);
    }

    #[tokio::test]
    async fn test_session_info_and_clear() {
        let (registry, store) = setup();
        let session = store.resolve_or_create(None).session;
        session.insert("user", json!("ann"));
        let handle = SessionHandle(Arc::clone(&session));

        let info = registry.get("session", &Method::GET).unwrap();
        let value = value_of(info.invoke(ctx(Method::GET, "session", Some(handle.clone()))).await.unwrap());
        assert_eq!(value["id"], session.id());
        assert_eq!(value["keys"], json!(["user"]));

        let clear = registry.get("session", &Method::DELETE).unwrap();
        let value = value_of(clear.invoke(ctx(Method::DELETE, "session", Some(handle))).await.unwrap());
        assert_eq!(value["cleared"], true);
        assert!(store.is_empty());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_session_node_requires_session() {
        let (registry, _store) = setup();
        let info = registry.get("session", &Method::GET).unwrap();
        match info.invoke(ctx(Method::GET, "session", None)).await {
            Err(NodeError::Method { code, .. }) => assert_eq!(code, NO_SESSION_CODE),
            _ => panic!("expected a method error"),
        }
    }
}
