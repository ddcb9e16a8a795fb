//! Response header helpers shared by the pipeline stages.
//!
//! # Responsibilities
//! - Parse the configured extra header list (`key:value;key:value`)
//! - Append extra headers without overwriting what a later stage already set
//! - Stamp cache-busting headers on dynamic responses
//!
//! # Design Decisions
//! - First write wins: a header already present on the response is never replaced
//! - Malformed pairs (no `:`) are skipped, matching what deployers expect from
//!   hand-edited header lists; invalid header tokens are rejected by validation

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use chrono::Utc;

use crate::http::request::ACCEPT_LANGUAGE;
use crate::resource::validators::format_http_date;

/// A fixed set of headers appended to responses.
#[derive(Debug, Clone, Default)]
pub struct ExtraHeaders {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl ExtraHeaders {
    /// Parse, dropping entries that are not valid HTTP headers.
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::new();
        for (key, value) in split_pairs(raw) {
            match (HeaderName::try_from(key), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => entries.push((name, value)),
                _ => tracing::warn!(header = %key, "Ignoring invalid extra header"),
            }
        }
        Self { entries }
    }

    /// Parse, failing on the first entry that is not a valid HTTP header.
    pub fn try_parse(raw: &str) -> Result<Self, String> {
        let mut entries = Vec::new();
        for (key, value) in split_pairs(raw) {
            let name = HeaderName::try_from(key)
                .map_err(|_| format!("invalid header name `{key}`"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header `{key}`"))?;
            entries.push((name, value));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert every header the map does not already contain.
    pub fn apply_missing(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.entries {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

fn split_pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
}

/// `Set-Cookie` value remembering a language choice, read back by
/// [`preferred_language`](crate::http::request::preferred_language).
pub fn language_cookie(language: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{ACCEPT_LANGUAGE}={language}; Path=/")).ok()
}

/// Mark a response as never cacheable.
pub fn set_no_cache(headers: &mut HeaderMap) {
    if let Ok(now) = HeaderValue::from_str(&format_http_date(Utc::now())) {
        headers.insert(header::EXPIRES, now);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}
