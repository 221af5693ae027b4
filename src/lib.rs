//! Plugin request router library.
//!
//! Routes `/{prefix}/{plugin}/{rest}` requests to page handlers and filters
//! that plugins register and unregister at runtime, to on-demand compiled
//! pages of development-mode plugins, or to the plugins' static assets.

pub mod admin;
pub mod config;
pub mod host;
pub mod dev;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod plugins;
pub mod routing;

pub use config::schema::RouterConfig;
pub use host::RouterCore;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
