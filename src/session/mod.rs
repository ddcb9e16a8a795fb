//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request
//!     → middleware.rs (SessionId query param, else cookie)
//!     → store.rs resolve_or_create (hit: slide expiry; miss/stale: mint new id)
//!     → SessionHandle in request extensions (read/mutated by later stages)
//!     → response: Set-Cookie + extra headers (first write wins)
//!
//! Background:
//!     sweeper task (fixed period) → store.rs sweep → expired records removed
//! ```
//!
//! # Design Decisions
//! - The store is owned by the server and injected, never a global
//! - Concurrent requests sharing a session may interleave state writes;
//!   only per-key operations are atomic

pub mod middleware;
pub mod store;

pub use middleware::{session_middleware, SessionHandle, SessionState, SESSION_ID_QUERY};
pub use store::{Resolution, Session, SessionStore};
