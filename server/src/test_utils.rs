//! Test doubles shared by the server's unit tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use db::test_utils::shared_movie_graph;
use db::{DbError, GraphConnection, GraphNode, PropertyMap, Relationship};
use serde_json::{Value as JsonValue, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::{Configuration, DatabaseSettings, keys};
use crate::fetch::{FetchError, RemoteSchemaLocator, SchemaSource};
use crate::lifecycle::{Collaborators, GraphConnector};
use crate::observability::{LogSink, Observability};
use crate::schema::{
    CanonicalSchemaDocument, CompileError, CompileOptions, ExecutableSchema, GraphSchemaCompiler,
    RawSchemaText, SchemaCompiler,
};

pub const PING_SDL: &str = "type Query { ping: String }";

/// A complete `serve` configuration backed by an in-memory database.
pub fn serve_config() -> Configuration {
    Configuration::from_pairs([
        (keys::DB_URI, ":memory:"),
        (keys::DB_USER, "neo4j"),
        (keys::DB_PASS, "s3cret"),
        (keys::PORT, "4000"),
        (keys::SCHEMA_REPO_OWNER, "acme"),
        (keys::SCHEMA_REPO_NAME, "schemas"),
        (keys::SCHEMA_FILE_PATH, "schema.graphql"),
        (keys::SCHEMA_REPO_TOKEN, "ghp_test"),
        (keys::PRODUCTION, "TRUE"),
    ])
}

/// `serve_config()` bound to an ephemeral loopback port.
pub fn ephemeral_config(production: &str) -> Configuration {
    serve_config()
        .with(keys::HOST, "127.0.0.1")
        .with(keys::PORT, "0")
        .with(keys::PRODUCTION, production)
}

pub fn locator() -> RemoteSchemaLocator {
    RemoteSchemaLocator::new("acme", "schemas", "schema.graphql", "ghp_test")
}

// =============================================================================
// Schema source
// =============================================================================

enum StubResponse {
    Text(String),
    Absent,
    Fail(Mutex<Option<FetchError>>),
}

/// Schema source with a canned answer that counts its calls.
pub struct StubSource {
    response: StubResponse,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn returning(sdl: &str) -> Self {
        Self::with(StubResponse::Text(sdl.to_string()))
    }

    pub fn absent() -> Self {
        Self::with(StubResponse::Absent)
    }

    /// Fails with `error` on the first call.
    pub fn failing(error: FetchError) -> Self {
        Self::with(StubResponse::Fail(Mutex::new(Some(error))))
    }

    fn with(response: StubResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaSource for StubSource {
    async fn fetch(&self, locator: &RemoteSchemaLocator) -> Result<Option<RawSchemaText>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            StubResponse::Text(sdl) => Ok(Some(RawSchemaText::new(format!("stub:{}", locator), sdl.clone()))),
            StubResponse::Absent => Ok(None),
            StubResponse::Fail(error) => Err(error.lock().unwrap().take().unwrap_or(FetchError::Status {
                status: 500,
                message: "stub exhausted".to_string(),
            })),
        }
    }
}

/// Wraps a [`StubSource`] and holds every fetch until [`GatedSource::open`].
pub struct GatedSource {
    inner: StubSource,
    pub entered: Notify,
    gate: Notify,
}

impl GatedSource {
    pub fn new(inner: StubSource) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SchemaSource for GatedSource {
    async fn fetch(&self, locator: &RemoteSchemaLocator) -> Result<Option<RawSchemaText>, FetchError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.fetch(locator).await
    }
}

// =============================================================================
// Database
// =============================================================================

/// Wraps a connection and counts `close` calls.
pub struct ClosableGraph {
    inner: Arc<dyn GraphConnection>,
    closes: AtomicUsize,
    closed: AtomicBool,
}

impl ClosableGraph {
    pub fn new(inner: Arc<dyn GraphConnection>) -> Self {
        Self {
            inner,
            closes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }
}

impl GraphConnection for ClosableGraph {
    fn backend_name(&self) -> &'static str {
        "Closable"
    }

    fn verify(&self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.inner.verify()
    }

    fn find_nodes(&self, label: &str, filter: &PropertyMap) -> Result<Vec<GraphNode>, DbError> {
        self.ensure_open()?;
        self.inner.find_nodes(label, filter)
    }

    fn related_nodes(&self, node: &GraphNode, relationship: &Relationship<'_>) -> Result<Vec<GraphNode>, DbError> {
        self.ensure_open()?;
        self.inner.related_nodes(node, relationship)
    }

    fn run_statement(&self, statement: &str, params: &PropertyMap) -> Result<Vec<JsonValue>, DbError> {
        self.ensure_open()?;
        self.inner.run_statement(statement, params)
    }

    fn close(&self) -> Result<(), DbError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Movie graph whose `find_nodes` waits until released.
pub struct BlockingGraph {
    inner: Arc<dyn GraphConnection>,
    pub entered: Notify,
    released: Mutex<bool>,
    wake: Condvar,
}

impl BlockingGraph {
    pub fn new() -> Self {
        Self {
            inner: shared_movie_graph(),
            entered: Notify::new(),
            released: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    pub fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.wake.notify_all();
    }
}

impl GraphConnection for BlockingGraph {
    fn backend_name(&self) -> &'static str {
        "Blocking"
    }

    fn verify(&self) -> Result<(), DbError> {
        self.inner.verify()
    }

    fn find_nodes(&self, label: &str, filter: &PropertyMap) -> Result<Vec<GraphNode>, DbError> {
        self.entered.notify_one();
        let mut released = self.released.lock().unwrap();
        while !*released {
            released = self.wake.wait(released).unwrap();
        }
        drop(released);
        self.inner.find_nodes(label, filter)
    }

    fn related_nodes(&self, node: &GraphNode, relationship: &Relationship<'_>) -> Result<Vec<GraphNode>, DbError> {
        self.inner.related_nodes(node, relationship)
    }

    fn run_statement(&self, statement: &str, params: &PropertyMap) -> Result<Vec<JsonValue>, DbError> {
        self.inner.run_statement(statement, params)
    }

    fn close(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// Connector handing out [`ClosableGraph`]s, over the movie graph unless
/// built with [`CountingConnector::with_graph`]. Accepts any URI.
#[derive(Default)]
pub struct CountingConnector {
    connects: AtomicUsize,
    opened: Mutex<Vec<Arc<ClosableGraph>>>,
    uris: Mutex<Vec<String>>,
    graph: Option<Arc<dyn GraphConnection>>,
    fail: bool,
}

impl CountingConnector {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_graph(graph: Arc<dyn GraphConnection>) -> Self {
        Self {
            graph: Some(graph),
            ..Self::default()
        }
    }

    /// `DB_URI` of every connect attempt.
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections handed out so far.
    pub fn opened(&self) -> Vec<Arc<ClosableGraph>> {
        self.opened.lock().unwrap().clone()
    }
}

impl GraphConnector for CountingConnector {
    fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn GraphConnection>, DbError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.uris.lock().unwrap().push(settings.uri.clone());
        if self.fail {
            return Err(DbError::OpenFailed {
                target: "stub".to_string(),
                message: "connection refused".to_string(),
            });
        }
        let inner = self.graph.clone().unwrap_or_else(shared_movie_graph);
        let graph = Arc::new(ClosableGraph::new(inner));
        self.opened.lock().unwrap().push(Arc::clone(&graph));
        Ok(graph)
    }
}

/// Compiler that always fails, after the connection has been opened.
pub struct FailingCompiler;

#[async_trait]
impl SchemaCompiler for FailingCompiler {
    async fn compile(
        &self,
        _document: &CanonicalSchemaDocument,
        _connection: Arc<dyn GraphConnection>,
        _options: &CompileOptions,
    ) -> Result<ExecutableSchema, CompileError> {
        Err(CompileError::Build("stub failure".to_string()))
    }
}

// =============================================================================
// Observability
// =============================================================================

/// Log sink that keeps every line.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn debug(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Collaborators built from test doubles.
pub fn collaborators(
    source: Arc<StubSource>,
    connector: Arc<CountingConnector>,
    sink: Arc<RecordingSink>,
) -> Collaborators {
    Collaborators {
        source,
        connector,
        compiler: Arc::new(GraphSchemaCompiler),
        observability: Observability::with_sink(sink),
    }
}

// =============================================================================
// Fake GitHub contents API
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SeenRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub api_version: Option<String>,
    pub git_ref: Option<String>,
}

type Seen = Arc<Mutex<Vec<SeenRequest>>>;

/// Local stand-in for `api.github.com`.
///
/// | path                 | response                              |
/// |----------------------|---------------------------------------|
/// | `schema.graphql`     | inline base64 file                    |
/// | `large.graphql`      | `encoding: none`, raw body on request |
/// | `dir`                | directory listing                     |
/// | `denied.graphql`     | 401                                   |
/// | `forbidden.graphql`  | 403                                   |
/// | `broken.graphql`     | 500                                   |
/// | anything else        | 404                                   |
pub struct FakeGitHub {
    addr: SocketAddr,
    seen: Seen,
    task: JoinHandle<()>,
}

impl FakeGitHub {
    pub const SCHEMA: &'static str = "type Query {\n  ping: String\n}\n";

    pub async fn start() -> Self {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/repos/:owner/:repo/contents/*path", get(contents))
            .with_state(Arc::clone(&seen));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, seen, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for FakeGitHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn contents(
    State(seen): State<Seen>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let accept = header("accept");
    seen.lock().unwrap().push(SeenRequest {
        path: path.clone(),
        authorization: header("authorization"),
        accept: accept.clone(),
        api_version: header("x-github-api-version"),
        git_ref: query.get("ref").cloned(),
    });

    let raw_requested = accept.as_deref() == Some("application/vnd.github.raw");
    match path.as_str() {
        "schema.graphql" => Json(file_entry(FakeGitHub::SCHEMA)).into_response(),
        "large.graphql" if raw_requested => FakeGitHub::SCHEMA.into_response(),
        "large.graphql" => {
            Json(json!({"type": "file", "encoding": "none", "content": ""})).into_response()
        }
        "dir" => Json(json!([{"type": "file", "name": "schema.graphql"}])).into_response(),
        "denied.graphql" => StatusCode::UNAUTHORIZED.into_response(),
        "forbidden.graphql" => StatusCode::FORBIDDEN.into_response(),
        "broken.graphql" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response(),
    }
}

/// Contents API file entry with base64 wrapped at 60 columns, as GitHub sends it.
fn file_entry(text: &str) -> JsonValue {
    let encoded = STANDARD.encode(text);
    let wrapped = encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    json!({"type": "file", "encoding": "base64", "content": wrapped})
}
