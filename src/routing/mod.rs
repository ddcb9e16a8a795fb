//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     "/user/:id/posts/:post"
//!     → matcher.rs (one anchored regex + ordered parameter names)
//!     → Freeze as immutable RoutePattern
//!
//! Incoming Request (path)
//!     → router.rs (ordered controller lookup)
//!     → matcher.rs (anchored match, capture parameters)
//!     → Return: controller + RouteParams, or 404
//! ```
//!
//! # Design Decisions
//! - Templates compiled at startup, immutable at runtime
//! - Malformed templates fail at compile time, never at match time
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use matcher::{RouteError, RouteMatch, RouteParams, RoutePattern};
pub use router::{Controller, ControllerRouter};
