//! Development-mode page compilation.
//!
//! # Data Flow
//! ```text
//! Dispatcher (page request)
//!     → bridge.rs (dev environment? source present?)
//!     → classpath.rs (plugin classes, lib/, core libs, dev classes)
//!     → compiler.rs (external page compiler)
//!     → handler factory → init → service
//! ```

pub mod bridge;
pub mod classpath;
pub mod compiler;

pub use bridge::{BridgeOutcome, DevCompileBridge};
pub use compiler::{CompileError, CompileJob, CompiledPage, PageCompiler, ProcessCompiler};
