//! Per-request dispatch.
//!
//! # Data Flow
//! ```text
//! remainder = {plugin}/{rest..} (routing prefix stripped)
//!     → filters covering the path (chain)
//!     → page extension?  Dev Compile Bridge → handled | declined
//!                        → Path Matcher → handler | not found
//!     → Path Matcher hit → handler
//!     → static asset     → file | not found
//!     → X-Frame-Options, status, metrics
//! ```
//!
//! # Design Decisions
//! - Every failure stops here: it is logged with detail and the client only
//!   sees a status code and a fixed body
//! - A retired handler that is still reachable through a stale lookup is
//!   reported as not found, never invoked

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::dev::BridgeOutcome;
use crate::host::RouterCore;
use crate::http::request::request_id;
use crate::http::response::{not_found, server_error, with_frame_options};
use crate::http::static_files;
use crate::observability::metrics;
use crate::plugins::handler::HandlerError;
use crate::routing::filters::{FilterChain, Terminal};
use crate::routing::key::RouteKey;
use crate::routing::registry::HandlerEntry;

/// Routes requests below the routing prefix.
#[derive(Clone)]
pub struct Dispatcher {
    core: Arc<RouterCore>,
}

impl Dispatcher {
    pub fn new(core: Arc<RouterCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<RouterCore> {
        &self.core
    }

    /// Dispatch `request` whose path below the routing prefix is `remainder`.
    pub async fn dispatch(&self, remainder: &str, request: Request<Body>) -> Response {
        let start = Instant::now();
        let remainder = remainder.trim_start_matches('/').to_string();
        let id = request_id(&request).to_string();
        let settings = self.core.settings();

        if remainder.is_empty() || remainder.split('/').any(|segment| segment == "..") {
            metrics::record_dispatch("not_found", start);
            return with_frame_options(not_found(), &settings.frame_options);
        }

        let filters = self
            .core
            .filters()
            .matching(&RouteKey::from_request_path(&remainder));
        let core = self.core.clone();
        let path = remainder.clone();
        let terminal: Terminal = Arc::new(move |request: Request<Body>| -> BoxFuture<'static, Result<Response, HandlerError>> {
            let core = core.clone();
            let path = path.clone();
            Box::pin(async move { route(&core, &path, request).await })
        });

        let response = match FilterChain::new(filters, terminal).proceed(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %id, path = %remainder, error = %e, "Dispatch failed");
                server_error()
            }
        };

        let status = response.status();
        let outcome = if status.is_server_error() {
            "error"
        } else if status.as_u16() == 404 {
            "not_found"
        } else {
            "ok"
        };
        metrics::record_dispatch(outcome, start);
        tracing::debug!(request_id = %id, path = %remainder, status = status.as_u16(), "Request dispatched");

        with_frame_options(response, &settings.frame_options)
    }
}

/// Pick and run the handler for `remainder`.
async fn route(core: &RouterCore, remainder: &str, request: Request<Body>) -> Result<Response, HandlerError> {
    if core.settings().is_page_request(remainder) {
        let request = match core.bridge().handle(remainder, request).await {
            BridgeOutcome::Handled(response) => return Ok(response),
            BridgeOutcome::Failed => return Ok(not_found()),
            BridgeOutcome::Declined(request) => request,
        };
        return match core.matcher().resolve(core.handlers(), remainder) {
            Some(entry) => invoke(&entry, request).await,
            None => Ok(not_found()),
        };
    }

    if let Some(entry) = core.matcher().resolve(core.handlers(), remainder) {
        return invoke(&entry, request).await;
    }

    static_files::serve(core.plugins(), remainder).await
}

async fn invoke(entry: &HandlerEntry, request: Request<Body>) -> Result<Response, HandlerError> {
    let Some(active) = entry.instance().enter() else {
        tracing::debug!(route = %entry.key(), "Handler retired during lookup");
        return Ok(not_found());
    };
    tracing::debug!(route = %entry.key(), plugin = %entry.owner(), "Invoking handler");
    active.handler().service(request).await
}
