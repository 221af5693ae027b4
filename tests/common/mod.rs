//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

use plugin_router::config::RouterConfig;
use plugin_router::dev::PageCompiler;
use plugin_router::lifecycle::Shutdown;
use plugin_router::plugins::{
    Filter, FilterConfig, HandlerCatalog, HandlerError, PageHandler, ServletConfig,
};
use plugin_router::routing::FilterChain;
use plugin_router::{HttpServer, RouterCore};

/// Counts lifecycle calls of the test handlers.
#[derive(Debug, Default)]
pub struct Calls {
    pub inits: AtomicUsize,
    pub destroys: AtomicUsize,
}

impl Calls {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

/// Page handler answering with a fixed body.
pub struct EchoPage {
    pub body: &'static str,
    pub calls: Arc<Calls>,
}

#[async_trait]
impl PageHandler for EchoPage {
    fn init(&self, _config: &ServletConfig) -> Result<(), HandlerError> {
        self.calls.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn service(&self, _request: Request<Body>) -> Result<Response, HandlerError> {
        Ok(Response::new(Body::from(self.body)))
    }

    fn destroy(&self) {
        self.calls.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Filter adding an `x-filtered` response header.
pub struct HeaderFilter {
    pub calls: Arc<Calls>,
}

#[async_trait]
impl Filter for HeaderFilter {
    fn init(&self, _config: &FilterConfig) -> Result<(), HandlerError> {
        self.calls.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn do_filter(&self, request: Request<Body>, chain: FilterChain) -> Result<Response, HandlerError> {
        let mut response = chain.proceed(request).await?;
        response
            .headers_mut()
            .insert("x-filtered", axum::http::HeaderValue::from_static("yes"));
        Ok(response)
    }

    fn destroy(&self) {
        self.calls.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Catalog with `test.Bar` / `test.Admin` pages and a `test.Header` filter.
pub fn catalog(calls: &Arc<Calls>) -> HandlerCatalog {
    let catalog = HandlerCatalog::new();
    let c = calls.clone();
    catalog.register_page("test.Bar", move || EchoPage {
        body: "bar page",
        calls: c.clone(),
    });
    let c = calls.clone();
    catalog.register_page("test.Admin", move || EchoPage {
        body: "admin page",
        calls: c.clone(),
    });
    let c = calls.clone();
    catalog.register_filter("test.Header", move || HeaderFilter { calls: c.clone() });
    catalog
}

/// Write a plugin directory with a manifest and optional web files.
pub fn write_plugin(root: &Path, name: &str, manifest: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let dir = root.join(name);
    let web_inf = dir.join("web/WEB-INF");
    std::fs::create_dir_all(&web_inf).unwrap();
    std::fs::write(web_inf.join("web.toml"), manifest).unwrap();
    for (path, contents) in files {
        let file = dir.join("web").join(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, contents).unwrap();
    }
    dir
}

pub fn core(config: &RouterConfig, catalog: HandlerCatalog, compiler: Option<Arc<dyn PageCompiler>>) -> Arc<RouterCore> {
    Arc::new(RouterCore::new(config, Arc::new(catalog), compiler))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send a GET through the router in-process.
pub async fn get(router: &Router, uri: &str) -> Reply {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    Reply {
        status,
        headers,
        body: body.to_vec(),
    }
}

/// Serve `core` on an ephemeral local port.
pub async fn start_server(config: &RouterConfig, core: Arc<RouterCore>, shutdown: &Shutdown) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, core);
    let (_, updates) = mpsc::unbounded_channel();
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates, stop).await;
    });
    addr
}
