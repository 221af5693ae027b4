//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! plugins directory
//!     → watcher.rs (scan at startup, PluginEvent at runtime)
//!     → plugin.rs (Plugin record, PluginDirectory)
//!     → lifecycle.rs (install / uninstall)
//!         → manifest.rs (web/WEB-INF/web.toml)
//!         → factory.rs (class name → PageHandler | Filter)
//!         → handler.rs (init, Managed wrapper, teardown)
//!         → routing registries (put / remove)
//! ```
//!
//! # Design Decisions
//! - Lifecycle work runs on its own task; request tasks only read registries
//! - One bad declaration never aborts a plugin's registration

pub mod factory;
pub mod handler;
pub mod lifecycle;
pub mod manifest;
pub mod plugin;
pub mod watcher;

pub use factory::{HandlerCatalog, HandlerFactory, LoadError, LoadedHandler};
pub use handler::{
    Filter, FilterConfig, HandlerError, HandlerKind, Managed, PageHandler, PluginContext, ServletConfig,
};
pub use lifecycle::{LifecycleError, PluginLifecycle, RegistrationReport, RegistrationWarning, UnregistrationReport};
pub use manifest::{HandlerDeclaration, PluginManifest};
pub use plugin::{DevEnvironment, Plugin, PluginDirectory, PluginId};
pub use watcher::{PluginEvent, PluginWatcher};
