//! Plugin handler manifests.
//!
//! A manifest lives at `web/WEB-INF/web.toml` inside the plugin directory and
//! declares the plugin's servlets and filters:
//!
//! ```toml
//! [[servlet]]
//! name = "admin"
//! class = "foo.AdminPage"
//! url-patterns = ["/admin/*", "/admin.jsp"]
//!
//! [[filter]]
//! name = "auth"
//! class = "foo.AuthFilter"
//! url-patterns = ["/*"]
//!
//! [filter.init-params]
//! realm = "foo"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::plugins::lifecycle::LifecycleError;

/// One declared servlet or filter.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct HandlerDeclaration {
    /// Logical name, unique within its section.
    pub name: String,

    /// Class the handler factory instantiates. Missing classes are reported
    /// per declaration rather than rejecting the manifest.
    #[serde(default)]
    pub class: Option<String>,

    #[serde(default)]
    pub url_patterns: Vec<String>,

    #[serde(default)]
    pub init_params: BTreeMap<String, String>,
}

impl HandlerDeclaration {
    /// The declared class name, if present and non-empty.
    pub fn class_name(&self) -> Option<&str> {
        self.class.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Parsed view of a plugin's handler manifest.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PluginManifest {
    #[serde(default, rename = "servlet")]
    servlets: Vec<HandlerDeclaration>,

    #[serde(default, rename = "filter")]
    filters: Vec<HandlerDeclaration>,
}

impl PluginManifest {
    pub fn new(servlets: Vec<HandlerDeclaration>, filters: Vec<HandlerDeclaration>) -> Self {
        Self { servlets, filters }
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, LifecycleError> {
        if !path.exists() {
            return Err(LifecycleError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| LifecycleError::ManifestUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| LifecycleError::ManifestInvalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn servlets(&self) -> &[HandlerDeclaration] {
        &self.servlets
    }

    pub fn filters(&self) -> &[HandlerDeclaration] {
        &self.filters
    }

}
