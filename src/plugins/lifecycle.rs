//! Plugin lifecycle manager.
//!
//! # Responsibilities
//! - Translate plugin install/uninstall into registry mutations
//! - Instantiate, initialize and register the servlets and filters a manifest declares
//! - Remove and tear down exactly what a plugin's manifest produced
//! - Offer a manifest-free registration path for programmatic handlers
//!
//! # Design Decisions
//! - Partial success: a declaration that cannot be loaded is a warning, the
//!   rest of the batch still registers
//! - Handlers are initialized before their first route becomes visible and
//!   torn down only after their last route was removed
//! - Removal is owner-checked, so a key that textually collides with another
//!   plugin's key is never removed on that plugin's behalf
//! - The parsed manifest is kept per plugin; uninstalling unregisters from
//!   that copy, so a deleted or rewritten manifest on disk cannot leave
//!   routes behind
//! - A servlet or filter whose last route is overwritten by a later
//!   registration is torn down
//! - No lock spans a batch; each registry mutation is individually atomic

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::observability::metrics;
use crate::plugins::factory::{HandlerFactory, LoadedHandler};
use crate::plugins::handler::{
    Filter, FilterConfig, HandlerKind, Managed, PageHandler, PluginContext, ServletConfig,
};
use crate::plugins::manifest::{HandlerDeclaration, PluginManifest};
use crate::plugins::plugin::{Plugin, PluginDirectory, PluginId};
use crate::routing::filters::{FilterEntry, FilterRegistry};
use crate::routing::key::RouteKey;
use crate::routing::registry::{HandlerEntry, HandlerRegistry};

/// Failures that abort a whole lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("manifest {} does not exist", path.display())]
    ManifestMissing { path: PathBuf },

    #[error("manifest {} could not be read: {source}", path.display())]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {} is malformed: {source}", path.display())]
    ManifestInvalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("plugin '{name}' is not installed")]
    UnknownPlugin { name: String },

    #[error("handler URL is missing")]
    MissingUrl,
}

/// A single declaration that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationWarning {
    pub kind: HandlerKind,
    pub name: String,
    pub reason: String,
}

/// Outcome of registering a plugin's manifest.
#[derive(Debug, Clone, Default)]
pub struct RegistrationReport {
    /// Servlets initialized and reachable.
    pub servlets: usize,
    /// Filters initialized and registered.
    pub filters: usize,
    /// Route keys added to the handler registry.
    pub routes: Vec<String>,
    pub warnings: Vec<RegistrationWarning>,
}

/// Outcome of unregistering a plugin's manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnregistrationReport {
    pub routes_removed: usize,
    pub servlets_destroyed: usize,
    pub filters_removed: usize,
    pub filters_destroyed: usize,
}

/// Applies plugin lifecycle events to the handler and filter registries.
pub struct PluginLifecycle {
    plugins: Arc<PluginDirectory>,
    handlers: Arc<HandlerRegistry>,
    filters: Arc<FilterRegistry>,
    factory: Arc<dyn HandlerFactory>,
    servlet_config: Arc<ServletConfig>,
    routing_prefix: String,
    manifests: DashMap<PluginId, Arc<PluginManifest>>,
}

impl PluginLifecycle {
    pub fn new(
        plugins: Arc<PluginDirectory>,
        handlers: Arc<HandlerRegistry>,
        filters: Arc<FilterRegistry>,
        factory: Arc<dyn HandlerFactory>,
        servlet_config: Arc<ServletConfig>,
        routing_prefix: impl Into<String>,
    ) -> Self {
        Self {
            plugins,
            handlers,
            filters,
            factory,
            servlet_config,
            routing_prefix: routing_prefix.into(),
            manifests: DashMap::new(),
        }
    }

    /// Install a plugin record and register its manifest.
    ///
    /// The plugin stays installed (its static content stays reachable) even
    /// when registration fails.
    pub fn install(&self, plugin: Plugin) -> Result<RegistrationReport, LifecycleError> {
        let plugin = Arc::new(plugin);
        if self.plugins.insert(plugin.clone()).is_some() {
            tracing::warn!(plugin = %plugin.id(), "Plugin installed twice; replacing record");
        }
        tracing::info!(plugin = %plugin.id(), directory = %plugin.directory().display(), "Installing plugin");
        self.register_all(&plugin, &plugin.manifest_path())
    }

    /// Unregister a plugin's manifest and forget the plugin record.
    pub fn uninstall(&self, name: &str) -> Result<UnregistrationReport, LifecycleError> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| LifecycleError::UnknownPlugin {
                name: name.to_string(),
            })?;
        tracing::info!(plugin = %plugin.id(), "Uninstalling plugin");
        let report = match self.manifests.get(plugin.id()).map(|r| r.value().clone()) {
            Some(manifest) => self.unregister_manifest(plugin.id(), &manifest),
            None => {
                tracing::debug!(plugin = %plugin.id(), "No registered manifest; nothing to unregister");
                UnregistrationReport::default()
            }
        };
        self.plugins.remove(plugin.id());
        Ok(report)
    }

    /// The manifest a plugin's current registrations came from.
    pub fn registered_manifest(&self, plugin: &PluginId) -> Option<Arc<PluginManifest>> {
        self.manifests.get(plugin).map(|r| r.value().clone())
    }

    /// Register every servlet and filter declared in the manifest at `manifest_path`.
    pub fn register_all(
        &self,
        plugin: &Arc<Plugin>,
        manifest_path: &Path,
    ) -> Result<RegistrationReport, LifecycleError> {
        let manifest = PluginManifest::load(manifest_path).map_err(|e| {
            tracing::error!(plugin = %plugin.id(), error = %e, "Could not register plugin handlers");
            e
        })?;
        Ok(self.register_manifest(plugin, &manifest))
    }

    /// Register the declarations of an already parsed manifest.
    pub fn register_manifest(&self, plugin: &Arc<Plugin>, manifest: &PluginManifest) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        self.manifests
            .insert(plugin.id().clone(), Arc::new(manifest.clone()));

        for declaration in manifest.servlets() {
            tracing::debug!(servlet = %declaration.name, plugin = %plugin.id(), "Loading servlet");
            match self.register_servlet(plugin, declaration) {
                Ok(keys) => {
                    report.servlets += 1;
                    report.routes.extend(keys.into_iter().map(|k| k.to_string()));
                    tracing::debug!(servlet = %declaration.name, plugin = %plugin.id(), "Servlet loaded");
                }
                Err(reason) => report.warnings.push(warn(plugin, HandlerKind::Servlet, declaration, reason)),
            }
        }

        for declaration in manifest.filters() {
            tracing::debug!(filter = %declaration.name, plugin = %plugin.id(), "Loading filter");
            match self.register_filter(plugin, declaration) {
                Ok(()) => {
                    report.filters += 1;
                    tracing::debug!(filter = %declaration.name, plugin = %plugin.id(), "Filter loaded");
                }
                Err(reason) => report.warnings.push(warn(plugin, HandlerKind::Filter, declaration, reason)),
            }
        }

        metrics::record_route_count(self.handlers.len());
        tracing::info!(
            plugin = %plugin.id(),
            servlets = report.servlets,
            filters = report.filters,
            routes = report.routes.len(),
            warnings = report.warnings.len(),
            "Plugin handlers registered"
        );
        report
    }

    fn register_servlet(
        &self,
        plugin: &Arc<Plugin>,
        declaration: &HandlerDeclaration,
    ) -> Result<Vec<RouteKey>, String> {
        let class_name = declaration
            .class_name()
            .ok_or("manifest does not define a class name")?;
        if declaration.url_patterns.is_empty() {
            return Err("no URL patterns declared".to_string());
        }

        let handler = match self.factory.load(plugin, class_name) {
            Ok(LoadedHandler::Page(handler)) => handler,
            Ok(LoadedHandler::Filter(_)) => {
                return Err(format!("class {class_name} is not a page handler"));
            }
            Err(e) => return Err(e.to_string()),
        };

        tracing::debug!(servlet = %declaration.name, plugin = %plugin.id(), "Initializing servlet");
        let config = self.servlet_config.with_overrides(&declaration.init_params);
        handler.init(&config).map_err(|e| e.to_string())?;

        let instance = Arc::new(Managed::new(handler));
        let keys: Vec<RouteKey> = declaration
            .url_patterns
            .iter()
            .map(|pattern| RouteKey::new(plugin.id(), pattern))
            .collect();
        let mut replaced: Vec<Arc<Managed<dyn PageHandler>>> = Vec::new();
        for key in &keys {
            if let Some(previous) = self
                .handlers
                .put(HandlerEntry::new(key.clone(), plugin.id().clone(), instance.clone()))
            {
                if !Arc::ptr_eq(previous.instance(), &instance) {
                    push_unique(&mut replaced, previous.instance().clone());
                }
            }
        }
        self.release_replaced_servlets(replaced);
        Ok(keys)
    }

    fn release_replaced_servlets(&self, replaced: Vec<Arc<Managed<dyn PageHandler>>>) {
        for instance in replaced {
            if !self.handlers.references(&instance) && instance.teardown() {
                tracing::info!("Destroyed servlet whose last route was overwritten");
            }
        }
    }

    fn register_filter(&self, plugin: &Arc<Plugin>, declaration: &HandlerDeclaration) -> Result<(), String> {
        let class_name = declaration
            .class_name()
            .ok_or("manifest does not define a class name")?;
        if declaration.url_patterns.is_empty() {
            return Err("no URL patterns declared".to_string());
        }

        let filter = match self.factory.load(plugin, class_name) {
            Ok(LoadedHandler::Filter(filter)) => filter,
            Ok(LoadedHandler::Page(_)) => {
                return Err(format!("class {class_name} is not a filter"));
            }
            Err(e) => return Err(e.to_string()),
        };

        tracing::debug!(filter = %declaration.name, plugin = %plugin.id(), "Initializing filter");
        let context = PluginContext::new(plugin.clone(), &self.routing_prefix, self.servlet_config.clone());
        let config = FilterConfig::new(declaration.name.clone(), context, declaration.init_params.clone());
        filter.init(&config).map_err(|e| e.to_string())?;

        let instance: Arc<Managed<dyn Filter>> = Arc::new(Managed::new(filter));
        let mut replaced: Vec<Arc<Managed<dyn Filter>>> = Vec::new();
        for pattern in &declaration.url_patterns {
            let previous = self.filters.add(
                RouteKey::new(plugin.id(), pattern),
                FilterEntry::new(class_name, instance.clone()),
            );
            if let Some(previous) = previous {
                if !Arc::ptr_eq(previous.instance(), &instance) {
                    push_unique(&mut replaced, previous.instance().clone());
                }
            }
        }
        for previous in replaced {
            if !self.filters.references(&previous) {
                previous.teardown();
            }
        }
        Ok(())
    }

    /// Remove and tear down every servlet and filter declared in the manifest
    /// at `manifest_path`.
    pub fn unregister_all(
        &self,
        plugin: &PluginId,
        manifest_path: &Path,
    ) -> Result<UnregistrationReport, LifecycleError> {
        let manifest = PluginManifest::load(manifest_path).map_err(|e| {
            tracing::error!(plugin = %plugin, error = %e, "Could not unregister plugin handlers");
            e
        })?;
        Ok(self.unregister_manifest(plugin, &manifest))
    }

    /// Remove the registrations an already parsed manifest produced.
    pub fn unregister_manifest(&self, plugin: &PluginId, manifest: &PluginManifest) -> UnregistrationReport {
        let mut report = UnregistrationReport::default();
        self.manifests.remove(plugin);

        for declaration in manifest.servlets() {
            tracing::debug!(servlet = %declaration.name, plugin = %plugin, "Unregistering servlet");
            let mut removed: Vec<Arc<Managed<dyn PageHandler>>> = Vec::new();
            for pattern in &declaration.url_patterns {
                let key = RouteKey::new(plugin, pattern);
                if let Some(entry) = self.handlers.remove_owned(key.as_str(), plugin) {
                    report.routes_removed += 1;
                    push_unique(&mut removed, entry.instance().clone());
                }
            }
            for instance in removed {
                if instance.teardown() {
                    report.servlets_destroyed += 1;
                }
            }
        }

        for declaration in manifest.filters() {
            let Some(class_name) = declaration.class_name() else {
                continue;
            };
            tracing::debug!(filter = %declaration.name, plugin = %plugin, "Unregistering filter");
            let mut removed: Vec<Arc<Managed<dyn Filter>>> = Vec::new();
            for pattern in &declaration.url_patterns {
                let key = RouteKey::new(plugin, pattern);
                if let Some(entry) = self.filters.remove(key.as_str(), class_name) {
                    report.filters_removed += 1;
                    push_unique(&mut removed, entry.instance().clone());
                }
            }
            for instance in removed {
                if instance.teardown() {
                    report.filters_destroyed += 1;
                }
            }
        }

        metrics::record_route_count(self.handlers.len());
        tracing::info!(
            plugin = %plugin,
            routes = report.routes_removed,
            servlets = report.servlets_destroyed,
            filters = report.filters_destroyed,
            "Plugin handlers unregistered"
        );
        report
    }

    /// Bind a programmatically constructed handler to `relative_url` of a
    /// plugin. The handler is not initialized here; the returned URL lets the
    /// caller finish that.
    pub fn register_one(
        &self,
        plugin_name: &str,
        handler: Arc<dyn PageHandler>,
        relative_url: &str,
    ) -> Result<String, LifecycleError> {
        let plugin = self.installed(plugin_name)?;
        if relative_url.is_empty() {
            return Err(LifecycleError::MissingUrl);
        }

        let key = RouteKey::new(plugin.id(), relative_url);
        tracing::debug!(plugin = %plugin.id(), route = %key, "Registering handler");
        let previous = self.handlers.put(HandlerEntry::new(
            key,
            plugin.id().clone(),
            Arc::new(Managed::new(handler)),
        ));
        if let Some(previous) = previous {
            self.release_replaced_servlets(vec![previous.instance().clone()]);
        }
        metrics::record_route_count(self.handlers.len());
        Ok(format!("/{}/{}{}", self.routing_prefix, plugin.id(), relative_url))
    }

    /// Unbind the handler at `relative_url`. The handler is returned, not
    /// destroyed; `Ok(None)` when nothing was bound there.
    pub fn unregister_one(
        &self,
        plugin_name: &str,
        relative_url: &str,
    ) -> Result<Option<Arc<dyn PageHandler>>, LifecycleError> {
        let plugin = self.installed(plugin_name)?;
        if relative_url.is_empty() {
            return Err(LifecycleError::MissingUrl);
        }

        let key = RouteKey::new(plugin.id(), relative_url);
        let removed = self.handlers.remove_owned(key.as_str(), plugin.id()).map(|entry| {
            entry.instance().retire();
            entry.instance().handler().clone()
        });
        metrics::record_route_count(self.handlers.len());
        Ok(removed)
    }

    fn installed(&self, name: &str) -> Result<Arc<Plugin>, LifecycleError> {
        self.plugins.get(name).ok_or_else(|| LifecycleError::UnknownPlugin {
            name: name.to_string(),
        })
    }
}

fn warn(
    plugin: &Plugin,
    kind: HandlerKind,
    declaration: &HandlerDeclaration,
    reason: String,
) -> RegistrationWarning {
    tracing::warn!(
        plugin = %plugin.id(),
        kind = %kind,
        name = %declaration.name,
        class = declaration.class.as_deref().unwrap_or(""),
        reason = %reason,
        "Could not load plugin handler"
    );
    RegistrationWarning {
        kind,
        name: declaration.name.clone(),
        reason,
    }
}

fn push_unique<H: ?Sized>(instances: &mut Vec<Arc<Managed<H>>>, instance: Arc<Managed<H>>) {
    if !instances.iter().any(|known| Arc::ptr_eq(known, &instance)) {
        instances.push(instance);
    }
}
