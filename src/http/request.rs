//! Request inspection helpers.
//!
//! # Responsibilities
//! - Decode query string pairs
//! - Read individual cookies from the `Cookie` header
//! - Select the client's preferred language
//!
//! # Design Decisions
//! - Request ID generation is delegated to tower-http (`x-request-id`, UUID v4)
//! - Helpers take borrowed parts so any stage can call them before the body is consumed

use axum::http::{header, HeaderMap, Uri};

/// Header (and cookie) naming the preferred language.
pub const ACCEPT_LANGUAGE: &str = "Accept-Language";

/// Request id header set by the tower-http request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Decode all query string pairs, in order.
pub fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// First value of a query parameter, if present.
pub fn query_value(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Value of a cookie sent by the client.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

/// Preferred language: cookie first, then the first `Accept-Language` entry.
pub fn preferred_language(headers: &HeaderMap, default: &str) -> String {
    if let Some(language) = cookie_value(headers, ACCEPT_LANGUAGE).filter(|l| !l.is_empty()) {
        return language;
    }

    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .split([',', ';'])
                .map(str::trim)
                .find(|entry| !entry.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

/// Request id assigned to this request, for log correlation.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}
