//! Installed plugin records.
//!
//! # Responsibilities
//! - Identify plugins by directory name
//! - Describe where a plugin keeps its manifest, web content, classes and libraries
//! - Track which plugins are installed (and which run in development mode)
//!
//! # Design Decisions
//! - `PluginDirectory` is a concurrent map; readers never block on installs
//! - A `DevEnvironment` is fixed for the lifetime of an installed plugin record;
//!   switching modes means re-installing the record

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

/// Opaque plugin identifier: the plugin's directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Development-mode settings for a plugin running from its source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevEnvironment {
    /// Directory holding the page sources and static content.
    pub web_root: PathBuf,
    /// Compiled classes of the plugin's own sources, if any.
    pub classes_dir: Option<PathBuf>,
}

/// An installed plugin.
#[derive(Debug, Clone)]
pub struct Plugin {
    id: PluginId,
    directory: PathBuf,
    class_path: Vec<PathBuf>,
    dev: Option<DevEnvironment>,
}

impl Plugin {
    /// Describe the plugin living in `directory`; its id is the directory name.
    pub fn from_directory(directory: impl Into<PathBuf>) -> Option<Self> {
        let directory = directory.into();
        let name = directory.file_name()?.to_str()?.to_string();
        Some(Self::new(PluginId::new(name), directory))
    }

    pub fn new(id: PluginId, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        let class_path = vec![directory.join("classes")];
        Self {
            id,
            directory,
            class_path,
            dev: None,
        }
    }

    pub fn with_dev_environment(mut self, dev: DevEnvironment) -> Self {
        self.dev = Some(dev);
        self
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Entries the plugin's own loader resolves classes from.
    pub fn class_path(&self) -> &[PathBuf] {
        &self.class_path
    }

    pub fn dev_environment(&self) -> Option<&DevEnvironment> {
        self.dev.as_ref()
    }

    /// Packaged web content.
    pub fn web_dir(&self) -> PathBuf {
        self.directory.join("web")
    }

    /// Where static content is served from: the dev web root when the plugin
    /// runs in development mode, the packaged web directory otherwise.
    pub fn web_root(&self) -> PathBuf {
        match &self.dev {
            Some(dev) => dev.web_root.clone(),
            None => self.web_dir(),
        }
    }

    /// Location of the handler manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.web_dir().join("WEB-INF").join("web.toml")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.directory.join("lib")
    }

    /// Output directory for pages compiled in development mode.
    pub fn compilation_dir(&self) -> PathBuf {
        self.directory.join("classes")
    }
}

/// Concurrent index of installed plugins.
#[derive(Debug, Default)]
pub struct PluginDirectory {
    plugins: DashMap<PluginId, Arc<Plugin>>,
}

impl PluginDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a plugin record.
    pub fn insert(&self, plugin: Arc<Plugin>) -> Option<Arc<Plugin>> {
        self.plugins.insert(plugin.id().clone(), plugin)
    }

    pub fn remove(&self, id: &PluginId) -> Option<Arc<Plugin>> {
        self.plugins.remove(id).map(|(_, plugin)| plugin)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Plugin>> {
        self.plugins
            .get(&PluginId::new(name))
            .map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(&PluginId::new(name))
    }

    /// Snapshot of installed plugins, sorted by id.
    pub fn list(&self) -> Vec<Arc<Plugin>> {
        let mut plugins: Vec<_> = self.plugins.iter().map(|r| r.value().clone()).collect();
        plugins.sort_by(|a, b| a.id().cmp(b.id()));
        plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
