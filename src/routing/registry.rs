//! Handler registry.
//!
//! # Responsibilities
//! - Map route keys to live page handlers
//! - Support concurrent put/remove from lifecycle tasks and get/scan from requests
//! - Remove entries only on behalf of the plugin that owns them
//!
//! # Design Decisions
//! - Backed by `DashMap`: per-key atomic insert/remove, no lock spanning a batch
//! - Entries are immutable `Arc`s; replacing a route is remove + insert
//! - A later registration under an identical key silently overwrites
//! - `keys()`/`entries()` are point-in-time snapshots with no ordering guarantee

use std::sync::Arc;

use dashmap::DashMap;

use crate::plugins::handler::{Managed, PageHandler};
use crate::plugins::PluginId;
use crate::routing::key::RouteKey;

/// A registered page handler under one route key.
pub struct HandlerEntry {
    key: RouteKey,
    owner: PluginId,
    instance: Arc<Managed<dyn PageHandler>>,
}

impl HandlerEntry {
    pub fn new(key: RouteKey, owner: PluginId, instance: Arc<Managed<dyn PageHandler>>) -> Self {
        Self { key, owner, instance }
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    /// The plugin whose registration produced this entry.
    pub fn owner(&self) -> &PluginId {
        &self.owner
    }

    pub fn instance(&self) -> &Arc<Managed<dyn PageHandler>> {
        &self.instance
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("instance", &self.instance)
            .finish()
    }
}

/// Thread-safe mapping from route key to handler entry.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: DashMap<RouteKey, Arc<HandlerEntry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaced.
    pub fn put(&self, entry: HandlerEntry) -> Option<Arc<HandlerEntry>> {
        let key = entry.key().clone();
        let previous = self.entries.insert(key.clone(), Arc::new(entry));
        if let Some(previous) = &previous {
            tracing::debug!(
                route = %key,
                previous_owner = %previous.owner(),
                "Route registration replaced an existing handler"
            );
        }
        previous
    }

    /// Remove whatever is registered under `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<HandlerEntry>> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    /// Remove the entry under `key` only if `owner` registered it.
    pub fn remove_owned(&self, key: &str, owner: &PluginId) -> Option<Arc<HandlerEntry>> {
        self.entries
            .remove_if(key, |_, entry| entry.owner() == owner)
            .map(|(_, entry)| entry)
    }

    pub fn get(&self, key: &str) -> Option<Arc<HandlerEntry>> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether any route still points at `instance`.
    pub fn references(&self, instance: &Arc<Managed<dyn PageHandler>>) -> bool {
        self.entries
            .iter()
            .any(|r| Arc::ptr_eq(r.value().instance(), instance))
    }

    /// Snapshot of the current keys, in no particular order.
    pub fn keys(&self) -> Vec<RouteKey> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshot of the current entries, in no particular order.
    pub fn entries(&self) -> Vec<Arc<HandlerEntry>> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::handler::HandlerError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;

    struct Noop;

    #[async_trait]
    impl PageHandler for Noop {
        async fn service(&self, _request: Request<Body>) -> Result<Response, HandlerError> {
            Ok(Response::new(Body::empty()))
        }
    }

    fn entry(plugin: &str, pattern: &str) -> HandlerEntry {
        let owner = PluginId::new(plugin);
        let handler: Arc<dyn PageHandler> = Arc::new(Noop);
        HandlerEntry::new(
            RouteKey::new(&owner, pattern),
            owner,
            Arc::new(Managed::new(handler)),
        )
    }

    #[test]
    fn test_put_get_remove() {
        let registry = HandlerRegistry::new();
        assert!(registry.put(entry("foo", "/bar.jsp")).is_none());

        assert!(registry.get("foo/bar.jsp").is_some());
        assert!(registry.get("foo/BAR.jsp").is_none()); // keys are already normalized
        assert_eq!(registry.len(), 1);

        let removed = registry.remove("foo/bar.jsp").unwrap();
        assert_eq!(removed.owner().as_str(), "foo");
        assert!(registry.remove("foo/bar.jsp").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_case_collision_overwrites() {
        let registry = HandlerRegistry::new();
        registry.put(entry("foo", "/Page.jsp"));
        let previous = registry.put(entry("FOO", "/page.JSP"));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("foo/page.jsp").unwrap().owner().as_str(), "FOO");
    }

    #[test]
    fn test_remove_owned_respects_owner() {
        let registry = HandlerRegistry::new();
        // "ab" + "/c" and "a" + "b/c" produce the same key
        registry.put(entry("ab", "/c"));

        assert!(registry.remove_owned("ab/c", &PluginId::new("a")).is_none());
        assert!(registry.contains("ab/c"));
        assert!(registry.remove_owned("ab/c", &PluginId::new("ab")).is_some());
        assert!(!registry.contains("ab/c"));
    }

    #[test]
    fn test_keys_snapshot() {
        let registry = HandlerRegistry::new();
        registry.put(entry("foo", "/a.jsp"));
        registry.put(entry("foo", "/admin/*"));

        let mut keys: Vec<String> = registry.keys().iter().map(|k| k.to_string()).collect();
        keys.sort();
        assert_eq!(keys, vec!["foo/a.jsp", "foo/admin/*"]);
    }

    #[test]
    fn test_references_follow_shared_instance() {
        let registry = HandlerRegistry::new();
        let first = entry("foo", "/a.jsp");
        let instance = first.instance().clone();
        let owner = first.owner().clone();
        registry.put(first);
        registry.put(HandlerEntry::new(RouteKey::new(&owner, "/b.jsp"), owner, instance.clone()));

        registry.remove("foo/a.jsp");
        assert!(registry.references(&instance));
        registry.remove("foo/b.jsp");
        assert!(!registry.references(&instance));
    }
}
