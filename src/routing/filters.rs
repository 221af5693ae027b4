//! Plugin filter registry and filter chain execution.
//!
//! # Responsibilities
//! - Hold filters keyed by plugin-qualified URL pattern
//! - Allow several filters per pattern, each removable by its class name
//! - Run the filters covering a request path in front of the dispatcher
//!
//! # Design Decisions
//! - Patterns are stored as route keys (`lowercase(plugin + pattern)`), so a
//!   filter never applies outside its own plugin's namespace
//! - Chain order: patterns in sorted order, registration order within a pattern
//! - A filter that does not call `proceed` short-circuits the request

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::plugins::handler::{Filter, HandlerError, Managed};
use crate::routing::key::RouteKey;

/// A filter registered under one pattern.
#[derive(Debug, Clone)]
pub struct FilterEntry {
    class_name: String,
    instance: Arc<Managed<dyn Filter>>,
}

impl FilterEntry {
    pub fn new(class_name: impl Into<String>, instance: Arc<Managed<dyn Filter>>) -> Self {
        Self {
            class_name: class_name.into(),
            instance,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn instance(&self) -> &Arc<Managed<dyn Filter>> {
        &self.instance
    }
}

/// Concurrent registry of plugin filters.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: DashMap<RouteKey, Vec<FilterEntry>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter for `pattern`. A filter of the same class already
    /// registered for the pattern is replaced and returned.
    pub fn add(&self, pattern: RouteKey, entry: FilterEntry) -> Option<FilterEntry> {
        let mut filters = self.filters.entry(pattern).or_default();
        match filters
            .iter_mut()
            .find(|existing| existing.class_name == entry.class_name)
        {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                filters.push(entry);
                None
            }
        }
    }

    /// Remove the filter of `class_name` registered for `pattern`.
    pub fn remove(&self, pattern: &str, class_name: &str) -> Option<FilterEntry> {
        let removed = {
            let mut filters = self.filters.get_mut(pattern)?;
            let index = filters.iter().position(|f| f.class_name == class_name)?;
            filters.remove(index)
        };
        self.filters.remove_if(pattern, |_, filters| filters.is_empty());
        Some(removed)
    }

    /// Live filters covering `path`, in chain order.
    pub fn matching(&self, path: &RouteKey) -> Vec<Arc<Managed<dyn Filter>>> {
        let mut patterns: Vec<(RouteKey, Vec<FilterEntry>)> = self
            .filters
            .iter()
            .filter(|r| r.key().covers(path))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        patterns.sort_by(|a, b| a.0.cmp(&b.0));

        patterns
            .into_iter()
            .flat_map(|(_, filters)| filters)
            .filter(|f| !f.instance.is_retired())
            .map(|f| f.instance)
            .collect()
    }

    /// Whether any pattern still holds `instance`.
    pub fn references(&self, instance: &Arc<Managed<dyn Filter>>) -> bool {
        self.filters
            .iter()
            .any(|r| r.value().iter().any(|f| Arc::ptr_eq(&f.instance, instance)))
    }

    /// Number of registered filters across all patterns.
    pub fn len(&self) -> usize {
        self.filters.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of `(pattern, class name)` pairs, sorted.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .filters
            .iter()
            .flat_map(|r| {
                let pattern = r.key().to_string();
                r.value()
                    .iter()
                    .map(|f| (pattern.clone(), f.class_name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        pairs.sort();
        pairs
    }
}

/// The end of a filter chain.
pub type Terminal =
    Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Result<Response, HandlerError>> + Send + Sync>;

/// The remaining filters of a request plus the handler at the end.
pub struct FilterChain {
    filters: Vec<Arc<Managed<dyn Filter>>>,
    position: usize,
    terminal: Terminal,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<Managed<dyn Filter>>>, terminal: Terminal) -> Self {
        Self {
            filters,
            position: 0,
            terminal,
        }
    }

    /// Pass the request to the next filter, or to the terminal handler.
    pub fn proceed(mut self, request: Request<Body>) -> BoxFuture<'static, Result<Response, HandlerError>> {
        Box::pin(async move {
            while let Some(managed) = self.filters.get(self.position).cloned() {
                self.position += 1;
                // skip filters torn down after the chain was assembled
                if let Some(active) = managed.enter() {
                    return active.handler().do_filter(request, self).await;
                }
            }
            (self.terminal)(request).await
        })
    }
}
