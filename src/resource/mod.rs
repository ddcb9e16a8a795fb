//! Resource cache gateway.
//!
//! # Responsibilities
//! - Resolve virtual resource addresses (`resource://<zone>/<path>`) through a provider
//! - Answer conditional GETs with 304 using `If-Modified-Since` then `If-None-Match`
//! - Stream or gzip full responses with cache headers
//!
//! # Design Decisions
//! - The gateway is advisory: misses and provider failures fall through to the
//!   next stage, never a 404 or 5xx from here
//! - Transient provider failures get a short bounded retry
//! - Providers are trait objects so bundles, folders and test fixtures compose

pub mod gateway;
pub mod media;
pub mod provider;
pub mod validators;

pub use gateway::{resource_middleware, ResourceGateway};
pub use provider::{
    CompositeProvider, MemoryProvider, ResourceDescriptor, ResourceError, ResourceProvider,
    ResourceStream, StaticFileProvider, VirtualAddress,
};
pub use validators::ETagStrategy;
