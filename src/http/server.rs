//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router for `/{prefix}/{*rest}`
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Bind server to listener and shut down gracefully
//! - Apply configuration reloads to the dispatch settings

use std::time::Duration;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::host::RouterCore;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::http::response::not_found;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Bearer key of the admin API.
    pub admin_key: Arc<str>,
}

impl AppState {
    pub fn new(core: Arc<RouterCore>, config: &RouterConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(core),
            admin_key: Arc::from(config.admin.api_key.as_str()),
        }
    }

    pub fn core(&self) -> &Arc<RouterCore> {
        self.dispatcher.core()
    }
}

/// HTTP server for plugin requests.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: &RouterConfig, core: Arc<RouterCore>) -> Self {
        let state = AppState::new(core, config);
        let router = Self::build_router(config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RouterConfig, state: AppState) -> Router {
        let prefix = &config.routing.prefix;
        Router::new()
            .route(&format!("/{prefix}/{{*rest}}"), any(dispatch_handler))
            .fallback(fallback_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request),
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The router, for serving in-process (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires, applying config updates as
    /// they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<RouterConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let core = self.state.core().clone();
        let reload_task = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                core.apply_config(&config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reload_task.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    request: Request<Body>,
) -> Response {
    state.dispatcher.dispatch(&rest, request).await
}

async fn fallback_handler() -> Response {
    not_found()
}
