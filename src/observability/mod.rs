//! Logging and metrics.
//!
//! # Data Flow
//! ```text
//! dispatcher, lifecycle manager, dev compile bridge
//!     → logging.rs (tracing events inside the per-request span)
//!     → metrics.rs (dispatch outcomes, route count, compilations)
//!
//! Output:
//!     → stdout (fmt layer, RUST_LOG or `observability.log_level`)
//!     → Prometheus scrape listener when `observability.metrics_enabled`
//! ```

pub mod logging;
pub mod metrics;
