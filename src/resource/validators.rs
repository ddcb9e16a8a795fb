//! HTTP cache validators: dates and entity tags.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// How the gateway derives a resource's ETag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ETagStrategy {
    /// 100ns ticks of the last-modified time. Free to compute.
    Timestamp,
    /// SHA-256 of the resource bytes.
    ContentHash,
}

impl ETagStrategy {
    pub fn from_flag(use_content_hash: bool) -> Self {
        if use_content_hash {
            ETagStrategy::ContentHash
        } else {
            ETagStrategy::Timestamp
        }
    }
}

/// RFC 1123 date as used by `Last-Modified`, `Expires` and `If-Modified-Since`.
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// ETag derived from the last-modified tick count.
pub fn timestamp_etag(last_modified: DateTime<Utc>) -> String {
    let ticks = i128::from(last_modified.timestamp()) * 10_000_000
        + i128::from(last_modified.timestamp_subsec_nanos() / 100);
    format!("\"{}\"", ticks)
}

/// ETag of a byte slice.
pub fn content_etag(bytes: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(bytes)))
}

/// ETag computed by reading a stream to its end. The caller rewinds it.
pub async fn content_etag_from<R>(stream: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("\"{}\"", hex::encode(hasher.finalize())))
}

/// `If-Modified-Since` hit: exact string equality with the formatted date.
pub fn is_not_modified_since(if_modified_since: Option<&str>, last_modified: DateTime<Utc>) -> bool {
    if_modified_since.is_some_and(|client| client == format_http_date(last_modified))
}

/// `If-None-Match` hit: `*`, or any listed tag equal to `etag` (weak prefix ignored).
pub fn etag_matches(if_none_match: Option<&str>, etag: &str) -> bool {
    let Some(client) = if_none_match else {
        return false;
    };
    let client = client.trim();
    if client == "*" || client == etag {
        return true;
    }
    client
        .split(',')
        .map(|tag| tag.trim())
        .map(|tag| tag.strip_prefix("W/").unwrap_or(tag))
        .any(|tag| tag == etag)
}
