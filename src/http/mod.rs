//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → dispatcher.rs (filters, dev bridge, registry, static assets)
//!     → static_files.rs (plugin web root)
//!     → response.rs (fixed error bodies, X-Frame-Options)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use dispatcher::Dispatcher;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
