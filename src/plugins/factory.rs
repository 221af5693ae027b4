//! Turning declared class names into handler instances.
//!
//! # Responsibilities
//! - Define the loading seam between manifests and handler code
//! - Provide an in-process catalog of constructors keyed by class name
//!
//! # Design Decisions
//! - Loading returns a typed variant (page or filter); capability checks are a
//!   match on that variant, never a runtime cast
//! - Plugin-scoped constructors shadow global ones with the same class name

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::plugins::handler::{Filter, HandlerKind, PageHandler};
use crate::plugins::plugin::{Plugin, PluginId};

/// A freshly instantiated, not yet initialized handler.
pub enum LoadedHandler {
    Page(Arc<dyn PageHandler>),
    Filter(Arc<dyn Filter>),
}

impl LoadedHandler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            LoadedHandler::Page(_) => HandlerKind::Servlet,
            LoadedHandler::Filter(_) => HandlerKind::Filter,
        }
    }
}

/// Why a class could not be turned into a handler.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("class '{class_name}' not found for plugin '{plugin}'")]
    ClassNotFound { plugin: String, class_name: String },

    #[error("class '{class_name}' could not be instantiated: {message}")]
    Instantiation { class_name: String, message: String },
}

/// Resolves a plugin-relative class name to a handler instance.
pub trait HandlerFactory: Send + Sync {
    fn load(&self, plugin: &Plugin, class_name: &str) -> Result<LoadedHandler, LoadError>;
}

type Constructor = Arc<dyn Fn() -> Result<LoadedHandler, String> + Send + Sync>;

/// A catalog of handler constructors registered by the embedding application.
#[derive(Default)]
pub struct HandlerCatalog {
    global: RwLock<HashMap<String, Constructor>>,
    scoped: RwLock<HashMap<(PluginId, String), Constructor>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page handler constructor for any plugin.
    pub fn register_page<F, H>(&self, class_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: PageHandler + 'static,
    {
        self.insert(
            None,
            class_name.into(),
            Arc::new(move || -> Result<LoadedHandler, String> {
                Ok(LoadedHandler::Page(Arc::new(constructor())))
            }),
        );
    }

    /// Register a filter constructor for any plugin.
    pub fn register_filter<F, H>(&self, class_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: Filter + 'static,
    {
        self.insert(
            None,
            class_name.into(),
            Arc::new(move || -> Result<LoadedHandler, String> {
                Ok(LoadedHandler::Filter(Arc::new(constructor())))
            }),
        );
    }

    /// Register a fallible constructor visible only to `plugin`.
    pub fn register_scoped<F>(&self, plugin: &PluginId, class_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<LoadedHandler, String> + Send + Sync + 'static,
    {
        self.insert(Some(plugin.clone()), class_name.into(), Arc::new(constructor));
    }

    fn insert(&self, plugin: Option<PluginId>, class_name: String, constructor: Constructor) {
        let inserted = match plugin {
            Some(plugin) => self
                .scoped
                .write()
                .map(|mut scoped| {
                    scoped.insert((plugin, class_name.clone()), constructor);
                })
                .is_ok(),
            None => self
                .global
                .write()
                .map(|mut global| {
                    global.insert(class_name.clone(), constructor);
                })
                .is_ok(),
        };
        if !inserted {
            tracing::error!(class = %class_name, "Handler catalog lock poisoned; constructor dropped");
        }
    }

    fn constructor(&self, plugin: &PluginId, class_name: &str) -> Option<Constructor> {
        let key = (plugin.clone(), class_name.to_string());
        if let Some(constructor) = self.scoped.read().ok()?.get(&key) {
            return Some(constructor.clone());
        }
        self.global.read().ok()?.get(class_name).cloned()
    }
}

impl HandlerFactory for HandlerCatalog {
    fn load(&self, plugin: &Plugin, class_name: &str) -> Result<LoadedHandler, LoadError> {
        let constructor =
            self.constructor(plugin.id(), class_name)
                .ok_or_else(|| LoadError::ClassNotFound {
                    plugin: plugin.id().to_string(),
                    class_name: class_name.to_string(),
                })?;
        constructor().map_err(|message| LoadError::Instantiation {
            class_name: class_name.to_string(),
            message,
        })
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

    struct Page(&'static str);

    #[async_trait]
    impl PageHandler for Page {
        async fn service(&self, _request: Request<Body>) -> Result<Response, HandlerError> {
            Ok(Response::new(Body::from(self.0)))
        }
    }

    fn plugin(name: &str) -> Plugin {
        Plugin::new(PluginId::new(name), format!("/plugins/{name}"))
    }

    #[test]
    fn test_unknown_class() {
        let catalog = HandlerCatalog::new();
        let err = catalog.load(&plugin("foo"), "foo.Missing").err().unwrap();
        assert!(matches!(err, LoadError::ClassNotFound { .. }));
    }

    #[test]
    fn test_global_page() {
        let catalog = HandlerCatalog::new();
        catalog.register_page("foo.Index", || Page("index"));

        let loaded = catalog.load(&plugin("foo"), "foo.Index").unwrap();
        assert_eq!(loaded.kind(), HandlerKind::Servlet);
    }

    #[test]
    fn test_scoped_shadows_global() {
        let catalog = HandlerCatalog::new();
        catalog.register_page("shared.Page", || Page("global"));
        catalog.register_scoped(&PluginId::new("foo"), "shared.Page", || {
            Err("broken build".to_string())
        });

        let err = catalog.load(&plugin("foo"), "shared.Page").err().unwrap();
        assert!(matches!(err, LoadError::Instantiation { .. }));
        assert!(catalog.load(&plugin("bar"), "shared.Page").is_ok());
    }

    #[test]
    fn test_later_registration_replaces() {
        let catalog = HandlerCatalog::new();
        catalog.register_scoped(&PluginId::new("foo"), "foo.Page", || Err("old".to_string()));
        catalog.register_scoped(&PluginId::new("foo"), "foo.Page", || {
            Ok(LoadedHandler::Page(Arc::new(Page("new"))))
        });
        catalog.register_page("any.Page", || Page("old"));
        catalog.register_page("any.Page", || Page("new"));

        assert!(catalog.load(&plugin("foo"), "foo.Page").is_ok());
        assert!(catalog.load(&plugin("bar"), "any.Page").is_ok());
    }
}
