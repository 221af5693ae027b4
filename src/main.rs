//! Plugin request router.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                    PLUGIN ROUTER                      │
//!                         │                                                       │
//!   Client Request        │  ┌─────────┐    ┌────────────┐    ┌───────────────┐  │
//!   ──────────────────────┼─▶│  http   │───▶│ dispatcher │───▶│ filter chain  │  │
//!                         │  │ server  │    └────────────┘    └───────┬───────┘  │
//!                         │  └─────────┘                              │          │
//!                         │                 ┌─────────────────────────┼───────┐  │
//!                         │                 ▼                         ▼       ▼  │
//!                         │         ┌──────────────┐   ┌──────────────┐ ┌──────┐ │
//!                         │         │ dev compile  │   │ path matcher │ │static│ │
//!                         │         │   bridge     │   │ + registry   │ │files │ │
//!                         │         └──────────────┘   └──────▲───────┘ └──────┘ │
//!                         │                                   │                  │
//!                         │   plugins dir ──▶ watcher ──▶ lifecycle manager      │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use plugin_router::admin::setup_admin_router;
use plugin_router::config::watcher::ConfigWatcher;
use plugin_router::config::{load_config, RouterConfig};
use plugin_router::lifecycle::signals::wait_for_signal;
use plugin_router::observability::{logging, metrics};
use plugin_router::plugins::{HandlerCatalog, PluginWatcher};
use plugin_router::{HttpServer, RouterCore, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "plugin-router", version, about = "Routes requests to runtime-installed plugins")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "plugin-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        prefix = %config.routing.prefix,
        plugins = %config.plugins.directory.display(),
        dev_plugins = config.plugins.dev.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Handler constructors are linked in by embedding applications.
    let catalog = Arc::new(HandlerCatalog::new());
    let core = Arc::new(RouterCore::from_config(&config, catalog));
    let installed = core.discover(&config.plugins.directory);
    tracing::info!(installed, routes = core.handlers().len(), "Plugins discovered");

    let shutdown = Shutdown::new();

    let _plugin_watcher = if config.plugins.watch && config.plugins.directory.is_dir() {
        let (watcher, mut events) = PluginWatcher::new(&config.plugins.directory);
        let guard = watcher.run()?;
        let core = core.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = events.recv() => {
                        let core = core.clone();
                        // handler init/destroy is plugin code and may block
                        if let Err(e) = tokio::task::spawn_blocking(move || core.apply_event(event)).await {
                            tracing::error!(error = %e, "Plugin event task failed");
                        }
                    }
                    _ = stop.recv() => break,
                    else => break,
                }
            }
        });
        Some(guard)
    } else {
        None
    };

    let (_config_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let server = HttpServer::new(&config, core.clone());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin = setup_admin_router(server.state().clone());
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    let server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    for plugin in core.plugins().list() {
        if let Err(e) = core.lifecycle().uninstall(plugin.id().as_str()) {
            tracing::warn!(plugin = %plugin.id(), error = %e, "Unregistering plugin at shutdown failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
