//! Path matching against the handler registry.
//!
//! # Responsibilities
//! - Resolve a request path (routing prefix stripped) to a registered handler
//! - Exact match first, then the wildcard/prefix fallback scan
//!
//! # Design Decisions
//! - Request paths are lowercased before lookup (keys are lowercase)
//! - Fallback compatibility is symmetric: the route's search key may be a
//!   prefix of the request path or the other way round
//! - Among several compatible routes the longest search key wins, ties broken
//!   by the smaller key, so resolution does not depend on map iteration order
//! - The scan works on a snapshot; a route registered mid-scan may be missed
//!   and a route removed mid-scan may still be returned (its retired state is
//!   checked before invocation)

use std::cmp::Ordering;
use std::sync::Arc;

use crate::routing::key::RouteKey;
use crate::routing::registry::{HandlerEntry, HandlerRegistry};

/// Resolves request paths against a [`HandlerRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PathMatcher;

impl PathMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Find the handler entry for `path`, if any.
    pub fn resolve(&self, registry: &HandlerRegistry, path: &str) -> Option<Arc<HandlerEntry>> {
        let request = RouteKey::from_request_path(path);
        if request.as_str().is_empty() {
            return None;
        }

        if let Some(entry) = registry.get(request.as_str()) {
            return Some(entry);
        }

        registry
            .entries()
            .into_iter()
            .filter(|entry| entry.key().is_compatible_with(&request))
            .max_by(|a, b| compare_candidates(a.key(), b.key()))
    }
}

/// Orders fallback candidates so that the preferred one compares greatest.
fn compare_candidates(a: &RouteKey, b: &RouteKey) -> Ordering {
    a.search_key()
        .len()
        .cmp(&b.search_key().len())
        .then_with(|| b.cmp(a))
}
