//! Development-mode page compilation through the dispatcher.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;

use plugin_router::config::{DevPluginConfig, RouterConfig};
use plugin_router::dev::{CompileError, CompileJob, CompiledPage, PageCompiler};
use plugin_router::plugins::{HandlerError, PageHandler};
use plugin_router::HttpServer;

use common::{catalog, core, get, write_plugin, Calls};

const MANIFEST: &str = r#"
[[servlet]]
name = "bar"
class = "test.Bar"
url-patterns = ["/bar.jsp"]
"#;

#[derive(Default)]
struct CountingCompiler {
    jobs: AtomicUsize,
}

#[async_trait]
impl PageCompiler for CountingCompiler {
    async fn compile(&self, job: &CompileJob) -> Result<CompiledPage, CompileError> {
        self.jobs.fetch_add(1, Ordering::SeqCst);
        assert!(job.source.exists());
        Ok(CompiledPage {
            class_name: "test.Compiled".into(),
        })
    }
}

struct CompiledPageHandler;

#[async_trait]
impl PageHandler for CompiledPageHandler {
    async fn service(&self, _request: Request<Body>) -> Result<Response, HandlerError> {
        Ok(Response::new(Body::from("freshly compiled")))
    }
}

struct Setup {
    _root: tempfile::TempDir,
    compiler: Arc<CountingCompiler>,
    server: HttpServer,
}

fn setup() -> Setup {
    let root = tempfile::tempdir().unwrap();
    let plugins = root.path().join("plugins");
    write_plugin(&plugins, "foo", MANIFEST, &[]);
    write_plugin(&plugins, "baz", MANIFEST, &[("bar.jsp", b"<p>baz</p>")]);

    let sources = root.path().join("foo-src/web");
    std::fs::create_dir_all(sources.join("reports")).unwrap();
    std::fs::write(sources.join("index.jsp"), "<p>index</p>").unwrap();
    std::fs::write(sources.join("reports/daily.jsp"), "<p>daily</p>").unwrap();

    let mut config = RouterConfig::default();
    config.plugins.dev.push(DevPluginConfig {
        name: "foo".into(),
        web_root: sources,
        classes_dir: None,
    });

    let calls = Arc::new(Calls::default());
    let catalog = catalog(&calls);
    catalog.register_page("test.Compiled", || CompiledPageHandler);

    let compiler = Arc::new(CountingCompiler::default());
    let core = core(&config, catalog, Some(compiler.clone() as Arc<dyn PageCompiler>));
    assert_eq!(core.discover(&plugins), 2);
    let server = HttpServer::new(&config, core);
    Setup {
        _root: root,
        compiler,
        server,
    }
}

#[tokio::test]
async fn test_page_source_is_compiled_per_request() {
    let setup = setup();
    let router = setup.server.router();

    for _ in 0..2 {
        let reply = get(&router, "/plugins/foo/index.jsp").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.text(), "freshly compiled");
    }
    let nested = get(&router, "/plugins/foo/reports/daily.jsp").await;
    assert_eq!(nested.text(), "freshly compiled");
    assert_eq!(setup.compiler.jobs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_missing_source_falls_back_to_registered_page() {
    let setup = setup();
    let reply = get(&setup.server.router(), "/plugins/foo/bar.jsp").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "bar page");
    assert_eq!(setup.compiler.jobs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plugin_without_dev_environment_never_compiles() {
    let setup = setup();
    let reply = get(&setup.server.router(), "/plugins/baz/bar.jsp").await;

    assert_eq!(reply.text(), "bar page");
    assert_eq!(setup.compiler.jobs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_page_without_handler_is_not_found() {
    let setup = setup();
    let reply = get(&setup.server.router(), "/plugins/foo/nothing.jsp").await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(setup.compiler.jobs.load(Ordering::SeqCst), 0);
}
