//! Static plugin assets.
//!
//! # Responsibilities
//! - Map `{plugin}/{rest..}` to a file below the plugin's web root
//! - Choose the content type from the fixed extension table
//!
//! # Design Decisions
//! - The dev web root replaces the packaged web directory while a plugin
//!   runs in development mode
//! - Anything under `WEB-INF` is private to the plugin and never served
//! - Paths that would leave the web root are treated as missing
//! - File bodies are streamed from disk with `Content-Length` taken from
//!   the file metadata

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use crate::http::response::not_found;
use crate::plugins::handler::HandlerError;
use crate::plugins::PluginDirectory;

const PRIVATE_DIR: &str = "WEB-INF";

/// Content type for a file name, from the fixed extension table.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "swf" => "application/x-shockwave-flash",
        "css" => "text/css",
        "js" => "text/javascript",
        "html" | "htm" => "text/html",
        _ => "image/gif",
    }
}

/// Resolve `remainder` (`{plugin}/{rest..}`) to a file on disk.
pub fn resolve(plugins: &PluginDirectory, remainder: &str) -> Option<PathBuf> {
    let (plugin_name, rest) = remainder.trim_start_matches('/').split_once('/')?;
    if rest.is_empty() {
        return None;
    }
    let plugin = plugins.get(plugin_name)?;

    let relative = Path::new(rest);
    let mut components = relative.components();
    if components
        .clone()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let first = components.next()?;
    if first.as_os_str().eq_ignore_ascii_case(PRIVATE_DIR) {
        return None;
    }
    Some(plugin.web_root().join(relative))
}

/// Stream a static asset, or not-found when there is none.
pub async fn serve(plugins: &PluginDirectory, remainder: &str) -> Result<Response, HandlerError> {
    let Some(path) = resolve(plugins, remainder) else {
        return Ok(not_found());
    };
    let length = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Ok(not_found()),
    };

    let file = tokio::fs::File::open(&path).await?;
    let content_type = content_type_for(remainder);
    tracing::debug!(path = %path.display(), content_type, bytes = length, "Serving static asset");

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(ReaderStream::new(file)))?)
}
