//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle Manager
//!     → registry.rs (put / remove_owned by RouteKey)
//!     → filters.rs  (add / remove by pattern + class name)
//!
//! Incoming request path (prefix stripped)
//!     → key.rs (normalize: lowercase, no leading '/')
//!     → filters.rs (filters covering the path, chained)
//!     → matcher.rs (exact lookup, then prefix-compatible fallback)
//!     → HandlerEntry or no match
//! ```
//!
//! # Design Decisions
//! - Registries are injected objects, not process-wide state
//! - No lock spans a registration batch; each mutation is atomic per key
//! - Deterministic fallback: longest search key wins

pub mod filters;
pub mod key;
pub mod matcher;
pub mod registry;

pub use filters::{FilterChain, FilterEntry, FilterRegistry};
pub use key::RouteKey;
pub use matcher::PathMatcher;
pub use registry::{HandlerEntry, HandlerRegistry};
