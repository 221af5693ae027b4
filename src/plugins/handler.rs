//! Handler abstraction for plugin-provided pages and filters.
//!
//! # Responsibilities
//! - Define the two handler capabilities: `PageHandler` and `Filter`
//! - Carry the configuration views handed to handlers at initialization
//! - Track the live/retired state of a registered instance
//!
//! # Design Decisions
//! - Handlers are shared as `Arc`s; removing one from a registry never
//!   invalidates a reference a request already holds
//! - `Managed::teardown` flips exactly once, so `destroy` runs at most once per
//!   instance no matter how many URL patterns point at it
//! - Calls go through `Managed::enter`; a retired instance hands out no new
//!   calls (callers treat it as "not found") and is destroyed only after the
//!   calls already running have finished

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use thiserror::Error;

use crate::plugins::plugin::{Plugin, PluginId};
use crate::routing::filters::FilterChain;

/// Failures raised while initializing or invoking a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler initialization failed: {0}")]
    Init(String),

    #[error("handler failed: {0}")]
    Service(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

/// A page handler ("servlet") contributed by a plugin.
#[async_trait]
pub trait PageHandler: Send + Sync {
    /// Called once before the handler becomes reachable.
    fn init(&self, _config: &ServletConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn service(&self, request: Request<Body>) -> Result<Response, HandlerError>;

    /// Called once after the handler stopped being reachable.
    fn destroy(&self) {}
}

/// A request filter contributed by a plugin.
#[async_trait]
pub trait Filter: Send + Sync {
    fn init(&self, _config: &FilterConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Process the request; call `chain.proceed` to continue down the chain.
    async fn do_filter(
        &self,
        request: Request<Body>,
        chain: FilterChain,
    ) -> Result<Response, HandlerError>;

    fn destroy(&self) {}
}

/// Which capability a handler provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Servlet,
    Filter,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Servlet => f.write_str("servlet"),
            HandlerKind::Filter => f.write_str("filter"),
        }
    }
}

/// Instances that can be torn down through a [`Managed`] wrapper.
pub trait Teardown: Send + Sync {
    fn release(&self);
}

impl Teardown for dyn PageHandler {
    fn release(&self) {
        self.destroy();
    }
}

impl Teardown for dyn Filter {
    fn release(&self) {
        self.destroy();
    }
}

const RETIRED: usize = 1 << (usize::BITS - 1);
const DESTROY: usize = 1 << (usize::BITS - 2);
const IN_FLIGHT: usize = DESTROY - 1;

/// A registered handler instance together with its teardown state.
///
/// The state word packs the retired flag, the pending-destroy flag and the
/// number of in-flight calls, so "still live?" and "start a call" are one
/// atomic step. `destroy` runs once the instance is torn down and its last
/// in-flight call has finished.
pub struct Managed<H: ?Sized> {
    handler: Arc<H>,
    state: AtomicUsize,
}

impl<H: ?Sized> Managed<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            state: AtomicUsize::new(0),
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn is_retired(&self) -> bool {
        self.state.load(Ordering::Acquire) & RETIRED != 0
    }

    /// Stop handing out new calls without destroying the instance.
    /// Returns `true` only for the first caller.
    pub fn retire(&self) -> bool {
        self.state.fetch_or(RETIRED, Ordering::AcqRel) & RETIRED == 0
    }

    /// Number of calls currently running through [`Managed::enter`].
    pub fn in_flight(&self) -> usize {
        self.state.load(Ordering::Acquire) & IN_FLIGHT
    }
}

impl<H: ?Sized + Teardown> Managed<H> {
    /// Begin a call on the live instance, or `None` once it is retired.
    /// The instance is not destroyed while the returned guard is alive.
    pub fn enter(self: &Arc<Self>) -> Option<Active<H>> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & RETIRED != 0 {
                return None;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(Active { managed: self.clone() }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Retire the instance and destroy it, immediately or when its last
    /// in-flight call ends. Returns `true` only for the first caller.
    pub fn teardown(&self) -> bool {
        let previous = self.state.fetch_or(RETIRED | DESTROY, Ordering::AcqRel);
        if previous & DESTROY != 0 {
            return false;
        }
        if previous & IN_FLIGHT == 0 {
            self.handler.release();
        }
        true
    }
}

/// An in-flight call on a [`Managed`] instance.
pub struct Active<H: ?Sized + Teardown> {
    managed: Arc<Managed<H>>,
}

impl<H: ?Sized + Teardown> Active<H> {
    pub fn handler(&self) -> &Arc<H> {
        &self.managed.handler
    }
}

impl<H: ?Sized + Teardown> Drop for Active<H> {
    fn drop(&mut self) {
        let previous = self.managed.state.fetch_sub(1, Ordering::AcqRel);
        if previous & IN_FLIGHT == 1 && previous & DESTROY != 0 {
            self.managed.handler.release();
        }
    }
}

impl<H: ?Sized> std::fmt::Debug for Managed<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Managed")
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

/// Host-wide configuration shared by every page handler.
#[derive(Debug, Clone, Default)]
pub struct ServletConfig {
    server_name: String,
    init_params: BTreeMap<String, String>,
}

impl ServletConfig {
    pub fn new(server_name: impl Into<String>, init_params: BTreeMap<String, String>) -> Self {
        Self {
            server_name: server_name.into(),
            init_params,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).map(String::as_str)
    }

    pub fn init_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.init_params.keys().map(String::as_str)
    }

    /// Layer handler-specific parameters over the shared ones.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, String>) -> Self {
        let mut init_params = self.init_params.clone();
        init_params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            server_name: self.server_name.clone(),
            init_params,
        }
    }
}

/// A view of the hosting context scoped to one plugin.
#[derive(Debug, Clone)]
pub struct PluginContext {
    plugin: Arc<Plugin>,
    context_path: String,
    servlet_config: Arc<ServletConfig>,
}

impl PluginContext {
    pub fn new(plugin: Arc<Plugin>, routing_prefix: &str, servlet_config: Arc<ServletConfig>) -> Self {
        let context_path = format!("/{}/{}", routing_prefix, plugin.id());
        Self {
            plugin,
            context_path,
            servlet_config,
        }
    }

    pub fn plugin_id(&self) -> &PluginId {
        self.plugin.id()
    }

    /// URL path under which the plugin is reachable, e.g. `/plugins/foo`.
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn web_root(&self) -> PathBuf {
        self.plugin.web_root()
    }

    pub fn servlet_config(&self) -> &ServletConfig {
        &self.servlet_config
    }

    /// Map a plugin-relative URL path to a file below the plugin's web root.
    /// Paths escaping the web root yield `None`.
    pub fn real_path(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.web_root().join(relative))
    }
}

/// Configuration handed to a filter at initialization.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    filter_name: String,
    context: PluginContext,
    init_params: BTreeMap<String, String>,
}

impl FilterConfig {
    pub fn new(
        filter_name: impl Into<String>,
        context: PluginContext,
        init_params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            filter_name: filter_name.into(),
            context,
            init_params,
        }
    }

    pub fn filter_name(&self) -> &str {
        &self.filter_name
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).map(String::as_str)
    }

    /// Declared parameter names; empty when the filter declares none.
    pub fn init_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.init_params.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        destroyed: AtomicUsize,
    }

    #[async_trait]
    impl PageHandler for Counting {
        async fn service(&self, _request: Request<Body>) -> Result<Response, HandlerError> {
            Ok(Response::new(Body::empty()))
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Arc<Counting>, Arc<Managed<dyn PageHandler>>) {
        let handler = Arc::new(Counting {
            destroyed: AtomicUsize::new(0),
        });
        let managed = Arc::new(Managed::new(handler.clone() as Arc<dyn PageHandler>));
        (handler, managed)
    }

    #[test]
    fn test_teardown_runs_once() {
        let (handler, managed) = counting();

        assert!(managed.enter().is_some());
        assert!(managed.teardown());
        assert!(!managed.teardown());
        assert!(managed.enter().is_none());
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_waits_for_in_flight_call() {
        let (handler, managed) = counting();

        let first = managed.enter().unwrap();
        let second = managed.enter().unwrap();
        assert_eq!(managed.in_flight(), 2);

        assert!(managed.teardown());
        assert!(managed.enter().is_none());
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 0);

        drop(first);
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(managed.in_flight(), 0);
    }

    #[test]
    fn test_retire_keeps_instance_alive() {
        let (handler, managed) = counting();

        let call = managed.enter().unwrap();
        assert!(managed.retire());
        assert!(!managed.retire());
        drop(call);
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 0);

        // a later teardown still destroys exactly once
        assert!(managed.teardown());
        assert_eq!(handler.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_servlet_config_overrides() {
        let mut shared = BTreeMap::new();
        shared.insert("theme".to_string(), "dark".to_string());
        shared.insert("locale".to_string(), "en".to_string());
        let config = ServletConfig::new("plugin-router", shared);

        let mut own = BTreeMap::new();
        own.insert("theme".to_string(), "light".to_string());
        let layered = config.with_overrides(&own);

        assert_eq!(layered.init_parameter("theme"), Some("light"));
        assert_eq!(layered.init_parameter("locale"), Some("en"));
        assert_eq!(config.init_parameter("theme"), Some("dark"));
    }

    #[test]
    fn test_plugin_context_paths() {
        let plugin = Arc::new(Plugin::new(PluginId::new("foo"), "/plugins/foo"));
        let context = PluginContext::new(plugin, "plugins", Arc::new(ServletConfig::default()));

        assert_eq!(context.context_path(), "/plugins/foo");
        assert_eq!(
            context.real_path("/images/a.png"),
            Some(PathBuf::from("/plugins/foo/web/images/a.png"))
        );
        assert_eq!(context.real_path("../secret"), None);
    }

    #[test]
    fn test_filter_config_without_params() {
        let plugin = Arc::new(Plugin::new(PluginId::new("foo"), "/plugins/foo"));
        let context = PluginContext::new(plugin, "plugins", Arc::new(ServletConfig::default()));
        let config = FilterConfig::new("auth", context, BTreeMap::new());

        assert_eq!(config.filter_name(), "auth");
        assert_eq!(config.init_parameter_names().count(), 0);
        assert_eq!(config.init_parameter("missing"), None);
    }
}
