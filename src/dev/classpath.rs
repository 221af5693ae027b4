//! Compile classpath assembly for development-mode plugins.

use std::path::{Path, PathBuf};

use crate::plugins::Plugin;

/// Classpath for compiling one of `plugin`'s pages, in order: the plugin's
/// own class path, every file in its `lib` directory, the host's core
/// runtime libraries, and the dev environment's classes directory.
pub async fn assemble(plugin: &Plugin, core_libs: &[PathBuf]) -> Vec<PathBuf> {
    let mut classpath: Vec<PathBuf> = plugin.class_path().iter().map(|p| absolute(p)).collect();
    classpath.extend(library_files(&plugin.lib_dir()).await);
    classpath.extend(core_libs.iter().map(|p| absolute(p)));
    if let Some(classes) = plugin.dev_environment().and_then(|dev| dev.classes_dir.as_ref()) {
        classpath.push(absolute(classes));
    }
    classpath
}

/// Files directly inside `lib_dir`, sorted. A missing directory yields none.
async fn library_files(lib_dir: &Path) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(lib_dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                if is_file {
                    files.push(absolute(&entry.path()));
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %lib_dir.display(), error = %e, "Stopped listing plugin libraries");
                break;
            }
        }
    }
    files.sort();
    files
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
