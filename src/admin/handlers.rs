//! Read-only admin endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub plugins: usize,
    pub routes: usize,
    pub filters: usize,
}

#[derive(Debug, Serialize)]
pub struct RouteStatus {
    pub key: String,
    pub plugin: String,
    pub retired: bool,
}

#[derive(Debug, Serialize)]
pub struct PluginStatus {
    pub name: String,
    pub directory: String,
    pub web_root: String,
    pub dev_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct FilterStatus {
    pub pattern: String,
    pub class: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let core = state.core();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        plugins: core.plugins().len(),
        routes: core.handlers().len(),
        filters: core.filters().len(),
    })
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteStatus>> {
    let mut routes: Vec<RouteStatus> = state
        .core()
        .handlers()
        .entries()
        .iter()
        .map(|entry| RouteStatus {
            key: entry.key().to_string(),
            plugin: entry.owner().to_string(),
            retired: entry.instance().is_retired(),
        })
        .collect();
    routes.sort_by(|a, b| a.key.cmp(&b.key));
    Json(routes)
}

pub async fn get_plugins(State(state): State<AppState>) -> Json<Vec<PluginStatus>> {
    let plugins = state
        .core()
        .plugins()
        .list()
        .iter()
        .map(|plugin| PluginStatus {
            name: plugin.id().to_string(),
            directory: plugin.directory().display().to_string(),
            web_root: plugin.web_root().display().to_string(),
            dev_mode: plugin.dev_environment().is_some(),
        })
        .collect();
    Json(plugins)
}

pub async fn get_filters(State(state): State<AppState>) -> Json<Vec<FilterStatus>> {
    let filters = state
        .core()
        .filters()
        .describe()
        .into_iter()
        .map(|(pattern, class)| FilterStatus { pattern, class })
        .collect();
    Json(filters)
}
