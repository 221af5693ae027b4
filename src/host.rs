//! Shared router state.
//!
//! # Responsibilities
//! - Own the plugin directory, handler registry and filter registry
//! - Wire the Lifecycle Manager and the Dev Compile Bridge onto them
//! - Hold the hot-swappable dispatch settings
//! - Apply plugin discovery and watcher events
//!
//! # Design Decisions
//! - One `RouterCore` per server, shared as `Arc`; no process-wide statics
//! - Dispatch settings live behind `ArcSwap`: readers never block a reload

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::HeaderValue;

use crate::config::{DevPluginConfig, RouterConfig};
use crate::dev::{DevCompileBridge, PageCompiler, ProcessCompiler};
use crate::plugins::watcher::{self, PluginEvent};
use crate::plugins::{
    DevEnvironment, HandlerFactory, LifecycleError, Plugin, PluginDirectory, PluginLifecycle,
    RegistrationReport, ServletConfig,
};
use crate::routing::{FilterRegistry, HandlerRegistry, PathMatcher};

/// Settings read on every request and swapped on config reload.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// `X-Frame-Options` value.
    pub frame_options: HeaderValue,
    /// Lowercase page-source extensions, without the dot.
    pub page_extensions: Vec<String>,
}

impl DispatchSettings {
    pub fn from_config(config: &RouterConfig) -> Self {
        let frame_options = HeaderValue::from_str(&config.security.frame_options).unwrap_or_else(|_| {
            tracing::warn!(
                value = %config.security.frame_options,
                "Invalid frame options value; using 'deny'"
            );
            HeaderValue::from_static("deny")
        });
        Self {
            frame_options,
            page_extensions: config
                .routing
                .page_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether the last segment of `path` carries a page-source extension.
    pub fn is_page_request(&self, path: &str) -> bool {
        let file = path.rsplit('/').next().unwrap_or(path);
        match file.rsplit_once('.') {
            Some((_, ext)) => self
                .page_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Everything a request or a lifecycle event needs.
pub struct RouterCore {
    routing_prefix: String,
    plugins: Arc<PluginDirectory>,
    handlers: Arc<HandlerRegistry>,
    filters: Arc<FilterRegistry>,
    matcher: PathMatcher,
    lifecycle: PluginLifecycle,
    bridge: DevCompileBridge,
    dev_plugins: HashMap<String, DevEnvironment>,
    settings: ArcSwap<DispatchSettings>,
}

impl RouterCore {
    /// Build the core with an explicit page compiler (or none).
    pub fn new(
        config: &RouterConfig,
        factory: Arc<dyn HandlerFactory>,
        compiler: Option<Arc<dyn PageCompiler>>,
    ) -> Self {
        let plugins = Arc::new(PluginDirectory::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let filters = Arc::new(FilterRegistry::new());
        let servlet_config = Arc::new(ServletConfig::new(
            config.servlet.server_name.clone(),
            config.servlet.init_params.clone(),
        ));

        let lifecycle = PluginLifecycle::new(
            plugins.clone(),
            handlers.clone(),
            filters.clone(),
            factory.clone(),
            servlet_config.clone(),
            config.routing.prefix.clone(),
        );
        let bridge = DevCompileBridge::new(
            plugins.clone(),
            factory,
            compiler,
            servlet_config,
            config.compiler.core_libs.clone(),
        );

        Self {
            routing_prefix: config.routing.prefix.clone(),
            plugins,
            handlers,
            filters,
            matcher: PathMatcher::new(),
            lifecycle,
            bridge,
            dev_plugins: config.plugins.dev.iter().map(dev_entry).collect(),
            settings: ArcSwap::from_pointee(DispatchSettings::from_config(config)),
        }
    }

    /// Build the core, running the configured external compiler program.
    pub fn from_config(config: &RouterConfig, factory: Arc<dyn HandlerFactory>) -> Self {
        let compiler = config.compiler.program.as_ref().map(|program| {
            Arc::new(ProcessCompiler::new(program.clone(), config.compiler.args.clone()))
                as Arc<dyn PageCompiler>
        });
        Self::new(config, factory, compiler)
    }

    pub fn routing_prefix(&self) -> &str {
        &self.routing_prefix
    }

    pub fn plugins(&self) -> &Arc<PluginDirectory> {
        &self.plugins
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    pub fn lifecycle(&self) -> &PluginLifecycle {
        &self.lifecycle
    }

    pub fn bridge(&self) -> &DevCompileBridge {
        &self.bridge
    }

    /// Current dispatch settings.
    pub fn settings(&self) -> Arc<DispatchSettings> {
        self.settings.load_full()
    }

    /// Swap in the dispatch settings of a reloaded configuration.
    pub fn apply_config(&self, config: &RouterConfig) {
        if config.routing.prefix != self.routing_prefix {
            tracing::warn!(
                current = %self.routing_prefix,
                requested = %config.routing.prefix,
                "Routing prefix changes require a restart"
            );
        }
        self.settings.store(Arc::new(DispatchSettings::from_config(config)));
        tracing::info!("Dispatch settings reloaded");
    }

    /// Install the plugin living in `directory`, attaching its configured dev
    /// environment if any.
    pub fn install_directory(&self, directory: &Path) -> Result<RegistrationReport, LifecycleError> {
        let Some(mut plugin) = Plugin::from_directory(directory) else {
            return Err(LifecycleError::UnknownPlugin {
                name: directory.display().to_string(),
            });
        };
        if let Some(dev) = self.dev_plugins.get(plugin.id().as_str()) {
            tracing::info!(plugin = %plugin.id(), web_root = %dev.web_root.display(), "Plugin runs in development mode");
            plugin = plugin.with_dev_environment(dev.clone());
        }
        self.lifecycle.install(plugin)
    }

    /// Install every plugin found in `root`. Returns how many installed
    /// without a registration failure.
    pub fn discover(&self, root: &Path) -> usize {
        let directories = match watcher::scan(root) {
            Ok(directories) => directories,
            Err(e) => {
                tracing::warn!(path = %root.display(), error = %e, "Cannot scan plugins directory");
                return 0;
            }
        };

        directories
            .iter()
            .filter(|directory| match self.install_directory(directory) {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!(path = %directory.display(), error = %e, "Plugin registration failed");
                    false
                }
            })
            .count()
    }

    /// Apply a plugin directory change.
    pub fn apply_event(&self, event: PluginEvent) {
        match event {
            PluginEvent::Added(directory) => {
                let name = directory
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                if self.plugins.contains(&name) {
                    if let Err(e) = self.lifecycle.uninstall(&name) {
                        tracing::warn!(plugin = %name, error = %e, "Unregistering previous version failed");
                    }
                }
                if let Err(e) = self.install_directory(&directory) {
                    tracing::error!(plugin = %name, error = %e, "Plugin registration failed");
                }
            }
            PluginEvent::Removed(name) => {
                if !self.plugins.contains(&name) {
                    return;
                }
                if let Err(e) = self.lifecycle.uninstall(&name) {
                    tracing::error!(plugin = %name, error = %e, "Plugin unregistration failed");
                }
            }
        }
    }
}

fn dev_entry(config: &DevPluginConfig) -> (String, DevEnvironment) {
    (
        config.name.clone(),
        DevEnvironment {
            web_root: config.web_root.clone(),
            classes_dir: config.classes_dir.clone(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevPluginConfig;
    use crate::plugins::HandlerCatalog;
    use std::path::PathBuf;

    fn core(config: &RouterConfig) -> RouterCore {
        RouterCore::new(config, Arc::new(HandlerCatalog::new()), None)
    }

    #[test]
    fn test_page_request_detection() {
        let settings = DispatchSettings::from_config(&RouterConfig::default());
        assert!(settings.is_page_request("foo/index.jsp"));
        assert!(settings.is_page_request("foo/admin/INDEX.JSP"));
        assert!(!settings.is_page_request("foo/images/icon.png"));
        assert!(!settings.is_page_request("foo/jsp/page"));
    }

    #[test]
    fn test_apply_config_swaps_settings() {
        let mut config = RouterConfig::default();
        let core = core(&config);
        assert_eq!(core.settings().frame_options, "deny");

        config.security.frame_options = "sameorigin".into();
        config.routing.page_extensions = vec!["page".into()];
        core.apply_config(&config);

        let settings = core.settings();
        assert_eq!(settings.frame_options, "sameorigin");
        assert!(settings.is_page_request("foo/a.page"));
    }

    #[test]
    fn test_discover_and_events() {
        let root = tempfile::tempdir().unwrap();
        for name in ["alpha", "beta"] {
            let manifest_dir = root.path().join(name).join("web/WEB-INF");
            std::fs::create_dir_all(&manifest_dir).unwrap();
            std::fs::write(manifest_dir.join("web.toml"), "").unwrap();
        }
        // no manifest: installed, but registration fails
        std::fs::create_dir_all(root.path().join("gamma")).unwrap();

        let mut config = RouterConfig::default();
        config.plugins.dev.push(DevPluginConfig {
            name: "beta".into(),
            web_root: PathBuf::from("/src/beta/web"),
            classes_dir: None,
        });
        let core = core(&config);

        assert_eq!(core.discover(root.path()), 2);
        assert_eq!(core.plugins().len(), 3);
        let beta = core.plugins().get("beta").unwrap();
        assert_eq!(beta.web_root(), PathBuf::from("/src/beta/web"));

        core.apply_event(PluginEvent::Removed("alpha".into()));
        assert!(!core.plugins().contains("alpha"));

        core.apply_event(PluginEvent::Added(root.path().join("alpha")));
        assert!(core.plugins().contains("alpha"));
    }
}
