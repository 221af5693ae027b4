//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the plugin router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// URL namespace and page recognition.
    pub routing: RoutingConfig,

    /// Plugin discovery and development-mode plugins.
    pub plugins: PluginsConfig,

    /// Page compiler used by development-mode plugins.
    pub compiler: CompilerConfig,

    /// Configuration shared by every page handler.
    pub servlet: ServletSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Routing namespace configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// First path segment of every plugin URL (`/{prefix}/{plugin}/...`).
    pub prefix: String,

    /// File extensions (without the dot) that mark a page-source request.
    pub page_extensions: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            prefix: "plugins".to_string(),
            page_extensions: vec!["jsp".to_string()],
        }
    }
}

/// Plugin discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory whose sub-directories are installed plugins.
    pub directory: PathBuf,

    /// Watch the directory and apply installs/uninstalls at runtime.
    pub watch: bool,

    /// Plugins running uncompiled from their source tree.
    pub dev: Vec<DevPluginConfig>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
            watch: true,
            dev: Vec::new(),
        }
    }
}

/// Development environment of one plugin.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DevPluginConfig {
    /// Plugin (directory) name.
    pub name: String,

    /// Source web root holding pages and static content.
    pub web_root: PathBuf,

    /// Compiled classes of the plugin's own sources.
    #[serde(default)]
    pub classes_dir: Option<PathBuf>,
}

/// External page compiler configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compiler executable. Development mode serves no compiled pages
    /// without one.
    pub program: Option<PathBuf>,

    /// Extra arguments passed before the generated ones.
    pub args: Vec<String>,

    /// Core runtime libraries appended to every compile classpath.
    pub core_libs: Vec<PathBuf>,
}

/// Configuration handed to page handlers at initialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServletSettings {
    pub server_name: String,
    pub init_params: BTreeMap<String, String>,
}

impl Default for ServletSettings {
    fn default() -> Self {
        Self {
            server_name: "plugin-router".to_string(),
            init_params: BTreeMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key rejected by validation when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Response hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Value of the `X-Frame-Options` header on dispatched responses.
    pub frame_options: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            frame_options: "deny".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
