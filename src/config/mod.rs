//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → wiring in host.rs
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → dispatch settings swapped atomically (arc-swap)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only dispatch settings hot-reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, CompilerConfig, DevPluginConfig, ListenerConfig, ObservabilityConfig,
    PluginsConfig, RouterConfig, RoutingConfig, SecurityConfig, ServletSettings, TimeoutConfig,
};
pub use validation::ValidationError;
