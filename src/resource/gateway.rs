//! Resource cache gateway: resolve, validate, serve.
//!
//! # Data Flow
//! ```text
//! GET /docs/resource/css/site.css
//!     → zone pattern `/:zone/resource/*path`  → resource://docs/resource/css/site.css
//!     → (miss) default zone, full path        → resource://0/docs/resource/css/site.css
//!     → each address tried as-is, then with the configured suffix
//!     → If-Modified-Since (exact) → If-None-Match → 304, or 200 with body
//! ```
//!
//! A miss or a provider error never produces a response here; the middleware
//! hands the request to the next stage instead.

use std::io::{SeekFrom, Write};
use std::ops::RangeInclusive;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{TimeDelta, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::ResourceConfig;
use crate::http::response::ExtraHeaders;
use crate::observability::metrics;
use crate::resilience::retry_bounded;
use crate::routing::{RouteError, RoutePattern};

use super::media::{is_compressible, media_type_for};
use super::provider::{ResourceDescriptor, ResourceError, ResourceProvider, ResourceStream, VirtualAddress};
use super::validators::{
    content_etag_from, etag_matches, format_http_date, is_not_modified_since, timestamp_etag,
    ETagStrategy,
};

const CHUNK_SIZE: usize = 16 * 1024;

/// Resolves virtual resources and answers conditional GETs for them.
pub struct ResourceGateway {
    provider: Arc<dyn ResourceProvider>,
    zone_pattern: RoutePattern,
    route: String,
    suffix: Option<String>,
    default_zone: String,
    expires_secs: u64,
    etag_strategy: ETagStrategy,
    compression: Option<RangeInclusive<u64>>,
    extra_headers: ExtraHeaders,
    resolve_attempts: u32,
    retry_base_delay_ms: u64,
}

impl ResourceGateway {
    pub fn new(config: &ResourceConfig, provider: Arc<dyn ResourceProvider>) -> Result<Self, RouteError> {
        let route = config.route.trim_matches('/').to_string();
        let zone_pattern = RoutePattern::compile(&format!("/:zone/{route}/*path"))?;

        Ok(Self {
            provider,
            zone_pattern,
            route,
            suffix: config.suffix.clone().filter(|s| !s.is_empty()),
            default_zone: config.default_zone.clone(),
            expires_secs: config.expires_secs,
            etag_strategy: ETagStrategy::from_flag(config.use_content_hash_etag),
            compression: config
                .enable_compression
                .then_some(config.compression_min_bytes..=config.compression_max_bytes),
            extra_headers: ExtraHeaders::parse(&config.extra_headers),
            resolve_attempts: config.resolve_attempts,
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    pub fn expires_secs(&self) -> u64 {
        self.expires_secs
    }

    /// Resolve `path` inside `zone`, then `path` + suffix. Errors count as absent.
    pub async fn resolve(&self, zone: &str, path: &str) -> Option<ResourceDescriptor> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return None;
        }

        let mut candidates = vec![VirtualAddress::new(zone, path)];
        if let Some(suffix) = &self.suffix {
            candidates.push(VirtualAddress::new(zone, format!("{path}{suffix}")));
        }

        let provider = &self.provider;
        for address in &candidates {
            let outcome = retry_bounded(
                self.resolve_attempts,
                self.retry_base_delay_ms,
                ResourceError::is_transient,
                move || provider.open(address),
            )
            .await;

            match outcome {
                Ok(Some(descriptor)) => {
                    tracing::debug!(address = %address, "Resource resolved");
                    return Some(descriptor);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Resource lookup failed, treating as absent");
                }
            }
        }
        None
    }

    /// Map a decoded request path to a resource: zone-scoped first, then the default zone.
    pub async fn locate(&self, request_path: &str) -> Option<ResourceDescriptor> {
        if let Some(params) = self.zone_pattern.captures(request_path) {
            if let (Some(zone), Some(rest)) = (params.get("zone"), params.get("path")) {
                let scoped = format!("{}/{}", self.route, rest);
                if let Some(found) = self.resolve(zone, &scoped).await {
                    return Some(found);
                }
            }
        }
        self.resolve(&self.default_zone, request_path).await
    }

    /// Validate against the client's cache and build the response.
    ///
    /// The descriptor is consumed; its stream is dropped on the 304 path and
    /// once the body has been fully sent otherwise.
    pub async fn serve(
        &self,
        request_headers: &HeaderMap,
        head: bool,
        descriptor: ResourceDescriptor,
        expires_secs: u64,
    ) -> Result<Response, ResourceError> {
        let ResourceDescriptor {
            mut stream,
            last_modified,
            location,
            length,
        } = descriptor;
        let io_error = |source: std::io::Error| ResourceError::Io {
            address: location.clone(),
            source,
        };

        if is_not_modified_since(header_str(request_headers, header::IF_MODIFIED_SINCE), last_modified) {
            return Ok(not_modified(None));
        }

        let etag = match self.etag_strategy {
            ETagStrategy::Timestamp => timestamp_etag(last_modified),
            ETagStrategy::ContentHash => {
                let etag = content_etag_from(&mut stream).await.map_err(io_error)?;
                stream.seek(SeekFrom::Start(0)).await.map_err(io_error)?;
                etag
            }
        };

        if etag_matches(header_str(request_headers, header::IF_NONE_MATCH), &etag) {
            return Ok(not_modified(Some(&etag)));
        }

        let media_type = media_type_for(&location);
        let mut response = Response::new(Body::empty());
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
        insert_str(headers, header::ETAG, &etag);
        insert_str(headers, header::LAST_MODIFIED, &format_http_date(last_modified));
        let expires = i64::try_from(expires_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or_else(Utc::now);
        insert_str(headers, header::EXPIRES, &format_http_date(expires));
        insert_str(headers, header::CACHE_CONTROL, &format!("max-age={expires_secs}"));

        // Only bodies of known, bounded size are buffered for gzip.
        let negotiable = self.compression.is_some() && is_compressible(media_type);
        if negotiable {
            response
                .headers_mut()
                .insert(header::VARY, HeaderValue::from_static("accept-encoding"));
        }
        let compress = negotiable
            && accepts_gzip(request_headers)
            && matches!((&self.compression, length), (Some(range), Some(len)) if range.contains(&len));

        if compress {
            let mut bytes = Vec::with_capacity(length.unwrap_or(0) as usize);
            stream.read_to_end(&mut bytes).await.map_err(io_error)?;
            drop(stream);

            let body = gzip(bytes).await.map_err(io_error)?;
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
            if !head {
                *response.body_mut() = Body::from(body);
            }
        } else {
            if let Some(length) = length {
                response
                    .headers_mut()
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
            if !head {
                *response.body_mut() = stream_body(stream);
            }
        }

        self.extra_headers.apply_missing(response.headers_mut());
        Ok(response)
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn insert_str(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn not_modified(etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    if let Some(etag) = etag {
        insert_str(response.headers_mut(), header::ETAG, etag);
    }
    response
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    let Some(accept) = header_str(headers, header::ACCEPT_ENCODING) else {
        return false;
    };
    accept.split(',').any(|entry| {
        let mut parts = entry.split(';').map(str::trim);
        let coding = parts.next().unwrap_or_default();
        let refused = parts.any(|p| p.replace(' ', "") == "q=0");
        !refused && (coding.eq_ignore_ascii_case("gzip") || coding == "*")
    })
}

async fn gzip(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
        encoder.write_all(&bytes)?;
        encoder.finish()
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Chunked body that owns the stream until EOF or the first read error.
fn stream_body(stream: Box<dyn ResourceStream>) -> Body {
    let chunks = futures_util::stream::unfold(Some(stream), |state| async move {
        let mut stream = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match stream.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok::<_, std::io::Error>(Bytes::from(buf)), Some(stream)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });
    Body::from_stream(chunks)
}

/// Pipeline stage: serve a resource for GET/HEAD or fall through.
pub async fn resource_middleware(
    State(gateway): State<Arc<ResourceGateway>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return next.run(request).await;
    }

    let Ok(path) = urlencoding::decode(request.uri().path()).map(|p| p.into_owned()) else {
        return next.run(request).await;
    };

    let Some(descriptor) = gateway.locate(&path).await else {
        metrics::record_resource("miss");
        return next.run(request).await;
    };

    let head = method == Method::HEAD;
    match gateway
        .serve(request.headers(), head, descriptor, gateway.expires_secs())
        .await
    {
        Ok(response) => {
            let outcome = if response.status() == StatusCode::NOT_MODIFIED {
                "not_modified"
            } else {
                "hit"
            };
            metrics::record_resource(outcome);
            tracing::debug!(path = %path, status = %response.status(), "Resource served");
            response
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Resource could not be served, passing on");
            metrics::record_resource("miss");
            next.run(request).await
        }
    }
}
