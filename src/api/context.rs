//! Per-invocation context handed to node handlers.

use std::sync::{Mutex, OnceLock, PoisonError};

use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{request::Parts, HeaderMap, HeaderValue, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::http::request::{preferred_language, query_pairs};
use crate::http::response::language_cookie;
use crate::session::SessionHandle;

use super::registry::NodeError;

/// Error code used when request input cannot be decoded.
pub const BAD_INPUT_CODE: i64 = 400;

/// Request data for one node call. The body has already been read.
#[derive(Debug)]
pub struct NodeContext {
    method: Method,
    uri: Uri,
    node_path: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Bytes,
    session: Option<SessionHandle>,
    language: String,
    form: OnceLock<Vec<(String, String)>>,
    chosen_language: Mutex<Option<String>>,
}

impl NodeContext {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, node_path: impl Into<String>, body: Bytes) -> Self {
        let query = query_pairs(&uri);
        Self {
            method,
            uri,
            node_path: node_path.into(),
            headers,
            query,
            body,
            session: None,
            language: String::new(),
            form: OnceLock::new(),
            chosen_language: Mutex::new(None),
        }
    }

    /// Build from request parts, picking up the session and the preferred language.
    pub fn from_parts(parts: &Parts, node_path: impl Into<String>, body: Bytes, default_language: &str) -> Self {
        let mut ctx = Self::new(
            parts.method.clone(),
            parts.uri.clone(),
            parts.headers.clone(),
            node_path,
            body,
        );
        ctx.session = parts.extensions.get::<SessionHandle>().cloned();
        ctx.language = preferred_language(&parts.headers, default_language);
        ctx
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Node path with the API prefix removed, e.g. `user/list`.
    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The request's session, when the session stage ran.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Remember `language` for later requests. The dispatcher sends it back as
    /// a cookie, which takes precedence over `Accept-Language` from then on.
    pub fn set_language(&self, language: impl Into<String>) {
        *self.chosen_language.lock().unwrap_or_else(PoisonError::into_inner) = Some(language.into());
    }

    /// `Set-Cookie` value for a language chosen with [`set_language`](Self::set_language).
    pub fn language_cookie(&self) -> Option<HeaderValue> {
        let chosen = self.chosen_language.lock().unwrap_or_else(PoisonError::into_inner);
        chosen.as_deref().and_then(language_cookie)
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Urlencoded body fields, parsed on first use.
    pub fn form(&self) -> &[(String, String)] {
        self.form.get_or_init(|| {
            url::form_urlencoded::parse(&self.body)
                .into_owned()
                .collect()
        })
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Form fields as a JSON object. Repeated fields become arrays. With
    /// `expand_json`, a single value that looks like a JSON object or array
    /// (`{...}` / `[...]`) and parses as one is embedded as that value.
    pub fn form_object(&self, expand_json: bool) -> Value {
        fields_to_object(self.form(), expand_json)
    }

    /// Bind the form fields to a typed struct. Values stay strings.
    pub fn form_as<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        bind_form(self.form_object(false))
    }

    /// Like [`form_as`](Self::form_as), but JSON-looking values are expanded first.
    pub fn form_as_expanded<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        bind_form(self.form_object(true))
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| NodeError::method(BAD_INPUT_CODE, format!("invalid JSON body: {e}")))
    }

    /// Decode the query string into a typed struct.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        Query::<T>::try_from_uri(&self.uri)
            .map(|Query(value)| value)
            .map_err(|e| NodeError::method(BAD_INPUT_CODE, format!("invalid query: {}", e.body_text())))
    }
}

fn bind_form<T: DeserializeOwned>(object: Value) -> Result<T, NodeError> {
    serde_json::from_value(object)
        .map_err(|e| NodeError::method(BAD_INPUT_CODE, format!("invalid form data: {e}")))
}

fn fields_to_object(fields: &[(String, String)], expand_json: bool) -> Value {
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for (key, value) in fields {
        match grouped.iter_mut().find(|(existing, _)| *existing == key.as_str()) {
            Some((_, values)) => values.push(value.as_str()),
            None => grouped.push((key.as_str(), vec![value.as_str()])),
        }
    }

    let object: Map<String, Value> = grouped
        .into_iter()
        .map(|(key, values)| {
            let value = match values.as_slice() {
                [single] => field_value(single, expand_json),
                many => Value::from(many.to_vec()),
            };
            (key.to_string(), value)
        })
        .collect();
    Value::Object(object)
}

fn field_value(text: &str, expand_json: bool) -> Value {
    let looks_like_json =
        (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'));
    if expand_json && looks_like_json {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return value;
        }
    }
    Value::String(text.to_string())
}
