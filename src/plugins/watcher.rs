//! Plugin directory discovery and watching.
//!
//! # Responsibilities
//! - List the plugins present in the plugins directory at startup
//! - Turn filesystem changes into install/uninstall events
//!
//! # Design Decisions
//! - A plugin counts as (re)installed when its manifest is written, not when
//!   its directory appears, so half-copied plugins are not registered
//! - A plugin counts as removed when its directory disappears

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Relative location of the manifest inside a plugin directory.
const MANIFEST_SUFFIX: [&str; 3] = ["web", "WEB-INF", "web.toml"];

/// A change to the set of installed plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// The plugin at this directory appeared or its manifest changed.
    Added(PathBuf),
    /// The plugin with this name disappeared.
    Removed(String),
}

/// Sub-directories of `root`, sorted. Hidden directories are skipped.
pub fn scan(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut plugins: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    plugins.sort();
    Ok(plugins)
}

/// Map one filesystem event below `root` to plugin events.
pub fn classify(root: &Path, event: &Event) -> Vec<PluginEvent> {
    let mut events = Vec::new();
    for path in &event.paths {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let Some(name) = parts.first() else {
            continue;
        };

        let classified = match event.kind {
            EventKind::Remove(_) if parts.len() == 1 => Some(PluginEvent::Removed(name.to_string())),
            EventKind::Create(_) | EventKind::Modify(_) if parts[1..] == MANIFEST_SUFFIX => {
                Some(PluginEvent::Added(root.join(name)))
            }
            _ => None,
        };
        if let Some(classified) = classified {
            if !events.contains(&classified) {
                events.push(classified);
            }
        }
    }
    events
}

/// Watches the plugins directory.
pub struct PluginWatcher {
    root: PathBuf,
    event_tx: mpsc::UnboundedSender<PluginEvent>,
}

impl PluginWatcher {
    /// Returns the watcher and a receiver for plugin events.
    pub fn new(root: &Path) -> (Self, mpsc::UnboundedReceiver<PluginEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                root: root.to_path_buf(),
                event_tx,
            },
            event_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.event_tx;
        let root = self.root.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for plugin_event in classify(&root, &event) {
                        tracing::debug!(event = ?plugin_event, "Plugin directory change detected");
                        let _ = tx.send(plugin_event);
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Plugin watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        tracing::info!(path = ?self.root, "Plugin watcher started");
        Ok(watcher)
    }
}
