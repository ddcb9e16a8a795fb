//! Resource providers: where virtual resource bytes come from.
//!
//! A provider maps a [`VirtualAddress`] (`resource://<zone>/<path>`) to a
//! [`ResourceDescriptor`]. `Ok(None)` means "not here"; errors are advisory and
//! the gateway treats them as not-found once retries are exhausted.

use std::fmt;
use std::io::{Cursor, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

/// A readable, rewindable byte source.
pub trait ResourceStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> ResourceStream for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Address of a resource inside a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualAddress {
    zone: String,
    path: String,
}

impl VirtualAddress {
    pub fn new(zone: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            zone: zone.into(),
            path: path.as_ref().trim_start_matches('/').to_string(),
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource://{}/{}", self.zone, self.path)
    }
}

/// A resolved resource. Dropping it releases the underlying handle.
pub struct ResourceDescriptor {
    pub stream: Box<dyn ResourceStream>,
    pub last_modified: DateTime<Utc>,
    /// Path-like token used to infer the media type.
    pub location: String,
    /// Byte length, when the provider knows it up front.
    pub length: Option<u64>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("last_modified", &self.last_modified)
            .field("location", &self.location)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    /// Worth retrying: the same lookup may succeed shortly.
    #[error("transient failure resolving {address}: {reason}")]
    Transient { address: String, reason: String },

    #[error("IO error resolving {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl ResourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ResourceError::Transient { .. })
    }

    fn from_io(address: &VirtualAddress, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                ResourceError::Transient {
                    address: address.to_string(),
                    reason: source.to_string(),
                }
            }
            _ => ResourceError::Io {
                address: address.to_string(),
                source,
            },
        }
    }
}

/// External source of resource streams.
pub trait ResourceProvider: Send + Sync {
    fn open<'a>(
        &'a self,
        address: &'a VirtualAddress,
    ) -> BoxFuture<'a, Result<Option<ResourceDescriptor>, ResourceError>>;
}

/// Serves files from a folder: the default zone maps to the folder itself,
/// every other zone to a sub-folder of the same name.
#[derive(Debug, Clone)]
pub struct StaticFileProvider {
    root: PathBuf,
    default_zone: String,
}

impl StaticFileProvider {
    pub fn new(root: impl Into<PathBuf>, default_zone: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_zone: default_zone.into(),
        }
    }

    /// Filesystem path for an address; `None` if it would escape the root.
    pub fn file_path(&self, address: &VirtualAddress) -> Option<PathBuf> {
        let mut path = self.root.clone();
        if address.zone() != self.default_zone {
            path.push(safe_relative(address.zone())?);
        }
        path.push(safe_relative(address.path())?);
        Some(path)
    }
}

fn safe_relative(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() || raw.contains('\\') {
        return None;
    }
    let relative = Path::new(raw);
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| relative.to_path_buf())
}

impl ResourceProvider for StaticFileProvider {
    fn open<'a>(
        &'a self,
        address: &'a VirtualAddress,
    ) -> BoxFuture<'a, Result<Option<ResourceDescriptor>, ResourceError>> {
        Box::pin(async move {
            let Some(path) = self.file_path(address) else {
                return Ok(None);
            };

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(ResourceError::from_io(address, e)),
            };
            let last_modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|e| ResourceError::from_io(address, e))?;

            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| ResourceError::from_io(address, e))?;

            Ok(Some(ResourceDescriptor {
                stream: Box::new(file),
                last_modified,
                location: address.path().to_string(),
                length: Some(metadata.len()),
            }))
        })
    }
}

#[derive(Debug, Clone)]
struct MemoryResource {
    bytes: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory assets registered per zone, e.g. bundled plugin files.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    entries: Arc<DashMap<(String, String), MemoryResource>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        zone: impl Into<String>,
        path: impl AsRef<str>,
        bytes: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        let address = VirtualAddress::new(zone, path);
        self.entries.insert(
            (address.zone, address.path),
            MemoryResource {
                bytes: bytes.into(),
                last_modified,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceProvider for MemoryProvider {
    fn open<'a>(
        &'a self,
        address: &'a VirtualAddress,
    ) -> BoxFuture<'a, Result<Option<ResourceDescriptor>, ResourceError>> {
        let key = (address.zone().to_string(), address.path().to_string());
        let found = self.entries.get(&key).map(|entry| entry.value().clone());

        Box::pin(async move {
            Ok(found.map(|resource| ResourceDescriptor {
                length: Some(resource.bytes.len() as u64),
                stream: Box::new(Cursor::new(resource.bytes)),
                last_modified: resource.last_modified,
                location: address.path().to_string(),
            }))
        })
    }
}

/// Tries each provider in order; the first hit wins.
#[derive(Clone, Default)]
pub struct CompositeProvider {
    providers: Vec<Arc<dyn ResourceProvider>>,
}

impl CompositeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ResourceProvider for CompositeProvider {
    fn open<'a>(
        &'a self,
        address: &'a VirtualAddress,
    ) -> BoxFuture<'a, Result<Option<ResourceDescriptor>, ResourceError>> {
        Box::pin(async move {
            let mut last_error = None;
            for provider in &self.providers {
                match provider.open(address).await {
                    Ok(Some(found)) => return Ok(Some(found)),
                    Ok(None) => {}
                    Err(e) => last_error = Some(e),
                }
            }
            last_error.map_or(Ok(None), Err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(mut descriptor: ResourceDescriptor) -> Vec<u8> {
        let mut bytes = Vec::new();
        descriptor.stream.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[test]
    fn test_virtual_address_display() {
        let address = VirtualAddress::new("docs", "/css/site.css");
        assert_eq!(address.path(), "css/site.css");
        assert_eq!(address.to_string(), "resource://docs/css/site.css");
    }

    #[test]
    fn test_static_paths_stay_inside_root() {
        let provider = StaticFileProvider::new("/srv/www", "0");
        assert_eq!(
            provider.file_path(&VirtualAddress::new("0", "index.html")),
            Some(PathBuf::from("/srv/www/index.html"))
        );
        assert_eq!(
            provider.file_path(&VirtualAddress::new("docs", "a/b.css")),
            Some(PathBuf::from("/srv/www/docs/a/b.css"))
        );
        assert_eq!(provider.file_path(&VirtualAddress::new("0", "../etc/passwd")), None);
        assert_eq!(provider.file_path(&VirtualAddress::new("..", "x")), None);
        assert_eq!(provider.file_path(&VirtualAddress::new("0", "")), None);
    }

    #[tokio::test]
    async fn test_static_file_provider_reads_file() {
        let root = std::env::temp_dir().join(format!("pipeline-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/readme.txt"), b"hello").unwrap();

        let provider = StaticFileProvider::new(&root, "0");
        let found = provider
            .open(&VirtualAddress::new("docs", "readme.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.length, Some(5));
        assert_eq!(found.location, "readme.txt");
        assert_eq!(read_all(found).await, b"hello");

        let missing = provider.open(&VirtualAddress::new("docs", "nope.txt")).await.unwrap();
        assert!(missing.is_none());
        let directory = provider.open(&VirtualAddress::new("0", "docs")).await.unwrap();
        assert!(directory.is_none());

        std::fs::remove_dir_all(&root).unwrap_or_default();
    }

    #[tokio::test]
    async fn test_memory_and_composite() {
        let first = MemoryProvider::new();
        let second = MemoryProvider::new();
        let now = Utc::now();
        first.insert("0", "a.txt", "from-first", now);
        second.insert("0", "a.txt", "from-second", now);
        second.insert("0", "b.txt", "only-second", now);

        let composite = CompositeProvider::new().with(first).with(second);
        assert_eq!(composite.len(), 2);

        let a = composite.open(&VirtualAddress::new("0", "a.txt")).await.unwrap().unwrap();
        assert_eq!(read_all(a).await, b"from-first");
        let b = composite.open(&VirtualAddress::new("0", "/b.txt")).await.unwrap().unwrap();
        assert_eq!(read_all(b).await, b"only-second");
        assert!(composite.open(&VirtualAddress::new("0", "c.txt")).await.unwrap().is_none());
    }
}
