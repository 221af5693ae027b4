//! Dev compile bridge.
//!
//! # Data Flow
//! ```text
//! page request for a plugin with a DevEnvironment
//!     → locate source under the dev web root      (missing → Declined)
//!     → compile into {plugin}/classes              (failure → Declined)
//!     → load + init the compiled handler           (failure → Declined)
//!     → service this one request                   (Handled | Failed)
//! ```
//!
//! # Design Decisions
//! - Fresh compile on every request, no caching; gated behind the plugin's
//!   DevEnvironment so production dispatch never reaches this code
//! - Compiled handlers are single-use: destroyed after their one request
//! - Every failure is logged here and only reported as an outcome

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::dev::classpath;
use crate::dev::compiler::{CompileJob, PageCompiler};
use crate::observability::metrics;
use crate::plugins::factory::{HandlerFactory, LoadedHandler};
use crate::plugins::handler::{PageHandler, ServletConfig};
use crate::plugins::{Plugin, PluginDirectory};

/// What the bridge did with a request.
pub enum BridgeOutcome {
    /// A freshly compiled page produced the response.
    Handled(Response),
    /// The bridge does not apply; the request continues to the registry.
    Declined(Request<Body>),
    /// The compiled page failed while servicing the request.
    Failed,
}

impl std::fmt::Debug for BridgeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeOutcome::Handled(response) => f.debug_tuple("Handled").field(&response.status()).finish(),
            BridgeOutcome::Declined(_) => f.write_str("Declined"),
            BridgeOutcome::Failed => f.write_str("Failed"),
        }
    }
}

/// Compiles and runs page sources of development-mode plugins on demand.
pub struct DevCompileBridge {
    plugins: Arc<PluginDirectory>,
    factory: Arc<dyn HandlerFactory>,
    compiler: Option<Arc<dyn PageCompiler>>,
    servlet_config: Arc<ServletConfig>,
    core_libs: Vec<PathBuf>,
}

impl DevCompileBridge {
    pub fn new(
        plugins: Arc<PluginDirectory>,
        factory: Arc<dyn HandlerFactory>,
        compiler: Option<Arc<dyn PageCompiler>>,
        servlet_config: Arc<ServletConfig>,
        core_libs: Vec<PathBuf>,
    ) -> Self {
        Self {
            plugins,
            factory,
            compiler,
            servlet_config,
            core_libs,
        }
    }

    /// Try to serve `remainder` (`{plugin}/{page}`, routing prefix stripped)
    /// from the plugin's page sources.
    pub async fn handle(&self, remainder: &str, request: Request<Body>) -> BridgeOutcome {
        let Some((plugin_name, page)) = remainder.trim_start_matches('/').split_once('/') else {
            return BridgeOutcome::Declined(request);
        };
        let Some(plugin) = self.plugins.get(plugin_name) else {
            return BridgeOutcome::Declined(request);
        };
        let Some(dev) = plugin.dev_environment() else {
            return BridgeOutcome::Declined(request);
        };
        let Some(source) = locate_source(&dev.web_root, page) else {
            return BridgeOutcome::Declined(request);
        };
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            tracing::debug!(plugin = %plugin.id(), page = %page, "No page source; falling through");
            return BridgeOutcome::Declined(request);
        }

        let Some(compiler) = &self.compiler else {
            tracing::warn!(plugin = %plugin.id(), page = %page, "No page compiler configured for development mode");
            return BridgeOutcome::Declined(request);
        };

        let handler = match self.compile_and_load(&plugin, compiler.as_ref(), page, source).await {
            Some(handler) => handler,
            None => return BridgeOutcome::Declined(request),
        };

        let outcome = match handler.service(request).await {
            Ok(response) => BridgeOutcome::Handled(response),
            Err(e) => {
                tracing::error!(plugin = %plugin.id(), page = %page, error = %e, "Compiled page failed");
                BridgeOutcome::Failed
            }
        };
        handler.destroy();
        outcome
    }

    async fn compile_and_load(
        &self,
        plugin: &Plugin,
        compiler: &dyn PageCompiler,
        page: &str,
        source: PathBuf,
    ) -> Option<Arc<dyn PageHandler>> {
        let output_dir = plugin.compilation_dir();
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            tracing::error!(dir = %output_dir.display(), error = %e, "Cannot create compilation directory");
            return None;
        }

        let job = CompileJob::for_page(
            page,
            source,
            output_dir,
            classpath::assemble(plugin, &self.core_libs).await,
        );
        let compiled = match compiler.compile(&job).await {
            Ok(compiled) => {
                metrics::record_compile("success");
                compiled
            }
            Err(e) => {
                metrics::record_compile("failure");
                tracing::error!(plugin = %plugin.id(), page = %page, error = %e, "Page compilation failed");
                return None;
            }
        };

        let handler = match self.factory.load(plugin, &compiled.class_name) {
            Ok(LoadedHandler::Page(handler)) => handler,
            Ok(LoadedHandler::Filter(_)) => {
                tracing::error!(class = %compiled.class_name, "Compiled page is not a page handler");
                return None;
            }
            Err(e) => {
                tracing::error!(plugin = %plugin.id(), error = %e, "Could not load compiled page");
                return None;
            }
        };

        if let Err(e) = handler.init(&self.servlet_config) {
            tracing::error!(class = %compiled.class_name, error = %e, "Compiled page failed to initialize");
            return None;
        }
        Some(handler)
    }
}

/// Source file for `page` below `web_root`; `None` when the page path
/// would leave the web root.
fn locate_source(web_root: &Path, page: &str) -> Option<PathBuf> {
    let relative = Path::new(page);
    if page.is_empty() || relative.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(web_root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::compiler::{CompileError, CompiledPage};
    use crate::plugins::factory::HandlerCatalog;
    use crate::plugins::handler::HandlerError;
    use crate::plugins::{DevEnvironment, PluginId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCompiler {
        jobs: Mutex<Vec<CompileJob>>,
        fail: bool,
    }

    #[async_trait]
    impl PageCompiler for FakeCompiler {
        async fn compile(&self, job: &CompileJob) -> Result<CompiledPage, CompileError> {
            self.jobs.lock().unwrap().push(job.clone());
            if self.fail {
                return Err(CompileError::Failed {
                    status: "exit status: 1".into(),
                    stderr: "syntax error".into(),
                });
            }
            Ok(CompiledPage {
                class_name: "pages.Compiled".into(),
            })
        }
    }

    struct Compiled {
        destroyed: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl PageHandler for Compiled {
        async fn service(&self, _request: Request<Body>) -> Result<Response, HandlerError> {
            if self.fail {
                return Err(HandlerError::Service("boom".into()));
            }
            Ok(Response::new(Body::from("fresh")))
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        bridge: DevCompileBridge,
        compiler: Arc<FakeCompiler>,
        destroyed: Arc<AtomicUsize>,
        plugin_dir: PathBuf,
    }

    fn fixture(dev: bool, compile_fails: bool, service_fails: bool) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let plugin_dir = root.path().join("foo");
        let web_root = root.path().join("src/web");
        std::fs::create_dir_all(web_root.join("admin")).unwrap();
        std::fs::write(web_root.join("admin/index.jsp"), "<html/>").unwrap();

        let mut plugin = Plugin::new(PluginId::new("foo"), &plugin_dir);
        if dev {
            plugin = plugin.with_dev_environment(DevEnvironment {
                web_root,
                classes_dir: None,
            });
        }
        let plugins = Arc::new(PluginDirectory::new());
        plugins.insert(Arc::new(plugin));

        let destroyed = Arc::new(AtomicUsize::new(0));
        let catalog = HandlerCatalog::new();
        let d = destroyed.clone();
        catalog.register_page("pages.Compiled", move || Compiled {
            destroyed: d.clone(),
            fail: service_fails,
        });

        let compiler = Arc::new(FakeCompiler {
            fail: compile_fails,
            ..Default::default()
        });
        let bridge = DevCompileBridge::new(
            plugins,
            Arc::new(catalog),
            Some(compiler.clone() as Arc<dyn PageCompiler>),
            Arc::new(ServletConfig::default()),
            Vec::new(),
        );
        Fixture {
            _root: root,
            bridge,
            compiler,
            destroyed,
            plugin_dir,
        }
    }

    fn request() -> Request<Body> {
        Request::new(Body::empty())
    }

    #[tokio::test]
    async fn test_compiles_and_serves_page() {
        let fx = fixture(true, false, false);

        let outcome = fx.bridge.handle("foo/admin/index.jsp", request()).await;
        let BridgeOutcome::Handled(response) = outcome else {
            panic!("expected Handled, got {outcome:?}");
        };
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"fresh");

        let jobs = fx.compiler.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].package, "pages.admin");
        assert_eq!(jobs[0].output_dir, fx.plugin_dir.join("classes"));
        assert!(fx.plugin_dir.join("classes").is_dir());
        assert_eq!(fx.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compiles_on_every_request() {
        let fx = fixture(true, false, false);
        for _ in 0..3 {
            fx.bridge.handle("foo/admin/index.jsp", request()).await;
        }
        assert_eq!(fx.compiler.jobs.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_without_dev_environment_never_compiles() {
        let fx = fixture(false, false, false);
        let outcome = fx.bridge.handle("foo/admin/index.jsp", request()).await;
        assert!(matches!(outcome, BridgeOutcome::Declined(_)));
        assert!(fx.compiler.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_declines() {
        let fx = fixture(true, false, false);
        let outcome = fx.bridge.handle("foo/admin/missing.jsp", request()).await;
        assert!(matches!(outcome, BridgeOutcome::Declined(_)));
        assert!(fx.compiler.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_plugin_and_bare_name_decline() {
        let fx = fixture(true, false, false);
        assert!(matches!(
            fx.bridge.handle("bar/admin/index.jsp", request()).await,
            BridgeOutcome::Declined(_)
        ));
        assert!(matches!(fx.bridge.handle("foo", request()).await, BridgeOutcome::Declined(_)));
        assert!(matches!(
            fx.bridge.handle("foo/../foo/admin/index.jsp", request()).await,
            BridgeOutcome::Declined(_)
        ));
    }

    #[tokio::test]
    async fn test_compile_failure_declines() {
        let fx = fixture(true, true, false);
        let outcome = fx.bridge.handle("foo/admin/index.jsp", request()).await;
        assert!(matches!(outcome, BridgeOutcome::Declined(_)));
        assert_eq!(fx.compiler.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_service_failure_is_failed() {
        let fx = fixture(true, false, true);
        let outcome = fx.bridge.handle("foo/admin/index.jsp", request()).await;
        assert!(matches!(outcome, BridgeOutcome::Failed));
        assert_eq!(fx.destroyed.load(Ordering::SeqCst), 1);
    }
}
