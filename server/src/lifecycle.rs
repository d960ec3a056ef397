//! Server lifecycle: startup in dependency order, serving, and draining.
//!
//! ```text
//! Initializing -> ConfigValidated -> SchemaReady -> Serving -> Draining -> Stopped
//!       \______________\________________\
//!                                        -> Failed
//! ```
//!
//! The controller owns the database connection and the server task. Drain
//! stops the listener, waits for in-flight requests (bounded by the drain
//! timeout), and only then closes the connection. Requests still running
//! when the timeout fires see a closed connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use db::{DatabaseConfig, DbError, GraphConnection};
use tokio::net::TcpListener;
use tokio::sync::{OnceCell, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::{Configuration, DatabaseSettings, DEFAULT_DRAIN_TIMEOUT, ServerSettings};
use crate::error::StartupError;
use crate::fetch::{FetchError, GitHubSchemaSource, SchemaSource};
use crate::http;
use crate::observability::Observability;
use crate::pipeline::SchemaPipeline;
use crate::schema::{CompileOptions, GraphSchemaCompiler, SchemaCompiler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    ConfigValidated,
    SchemaReady,
    Serving,
    Draining,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// Whether the controller may move from `self` to `next`.
    ///
    /// `Stopped` is terminal and `Draining` only leads to `Stopped`, so a
    /// startup racing a drain cannot bring the server back.
    pub fn can_move_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match self {
            Stopped => false,
            Draining => next == Stopped,
            Failed => matches!(next, Draining | Stopped),
            _ => next != self,
        }
    }
}

/// Opens the database connection described by the settings.
pub trait GraphConnector: Send + Sync {
    fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn GraphConnection>, DbError>;
}

/// Picks the backend from the URI scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlConnector;

impl GraphConnector for UrlConnector {
    fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn GraphConnection>, DbError> {
        DatabaseConfig::from_url(&settings.uri, settings.graph_name.as_deref())?
            .connect(&settings.credentials)
    }
}

/// Everything the controller talks to.
pub struct Collaborators {
    pub source: Arc<dyn SchemaSource>,
    pub connector: Arc<dyn GraphConnector>,
    pub compiler: Arc<dyn SchemaCompiler>,
    pub observability: Observability,
}

impl Collaborators {
    /// GitHub, URL-selected database, graph resolvers and tracing output.
    pub fn production() -> Result<Self, FetchError> {
        Ok(Self {
            source: Arc::new(GitHubSchemaSource::new()?),
            connector: Arc::new(UrlConnector),
            compiler: Arc::new(GraphSchemaCompiler),
            observability: Observability::default(),
        })
    }
}

struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

pub struct LifecycleController {
    config: Configuration,
    collaborators: Collaborators,
    state: watch::Sender<LifecycleState>,
    connection: Mutex<Option<Arc<dyn GraphConnection>>>,
    server: tokio::sync::Mutex<Option<ServerHandle>>,
    exited: Mutex<Option<watch::Receiver<bool>>>,
    drain_timeout: Mutex<Duration>,
    started: AtomicBool,
    draining: AtomicBool,
    drained: OnceCell<()>,
}

impl LifecycleController {
    pub fn new(config: Configuration, collaborators: Collaborators) -> Self {
        let (state, _) = watch::channel(LifecycleState::Initializing);
        Self {
            config,
            collaborators,
            state,
            connection: Mutex::new(None),
            server: tokio::sync::Mutex::new(None),
            exited: Mutex::new(None),
            drain_timeout: Mutex::new(DEFAULT_DRAIN_TIMEOUT),
            started: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            drained: OnceCell::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Address the listener is bound to, once serving.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|handle| handle.local_addr)
    }

    /// Validate, fetch and merge, connect, compile, then bind and serve.
    ///
    /// On failure the controller ends in `Failed` and any connection opened
    /// along the way is closed. Only the first call on a controller that has
    /// not been drained runs; any other returns `AlreadyStarted`.
    pub async fn start(&self) -> Result<SocketAddr, StartupError> {
        if self.started.swap(true, Ordering::SeqCst) || self.draining.load(Ordering::SeqCst) {
            let state = self.state();
            tracing::warn!(?state, "Ignoring start: controller already started or drained");
            return Err(StartupError::AlreadyStarted { state });
        }

        match self.try_start().await {
            Ok(addr) => Ok(addr),
            Err(error) => {
                tracing::error!("Startup failed: {}", error);
                self.close_connection().await;
                self.set_state(LifecycleState::Failed);
                Err(error)
            }
        }
    }

    async fn try_start(&self) -> Result<SocketAddr, StartupError> {
        let settings = ServerSettings::from_config(&self.config)?;
        *lock(&self.drain_timeout) = settings.drain_timeout;
        self.set_state(LifecycleState::ConfigValidated);

        let pipeline = SchemaPipeline::new(Arc::clone(&self.collaborators.source));
        let document = pipeline
            .assemble(&settings.locator, settings.local_schema_dir.as_deref())
            .await?;

        let connection = self.connect(&settings.database).await?;
        *lock(&self.connection) = Some(Arc::clone(&connection));

        let options = CompileOptions {
            introspection: settings.introspection,
            observability: self.collaborators.observability.clone(),
        };
        let schema = self
            .collaborators
            .compiler
            .compile(&document, connection, &options)
            .await?;
        self.set_state(LifecycleState::SchemaReady);

        // Held until the handle is stored so drain either sees it or stops us here.
        let mut server = self.server.lock().await;
        if self.draining.load(Ordering::SeqCst) {
            return Err(StartupError::Interrupted);
        }

        let listener = TcpListener::bind(settings.listen)
            .await
            .map_err(|source| StartupError::BindFailed {
                addr: settings.listen,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartupError::BindFailed {
                addr: settings.listen,
                source,
            })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);
        let app = http::router(schema);
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            let _ = exited_tx.send(true);
            result
        });

        *server = Some(ServerHandle {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        });
        *lock(&self.exited) = Some(exited_rx);
        self.set_state(LifecycleState::Serving);
        drop(server);

        tracing::info!(
            introspection = settings.introspection,
            "Server ready at http://{}/graphql",
            local_addr
        );
        Ok(local_addr)
    }

    async fn connect(&self, settings: &DatabaseSettings) -> Result<Arc<dyn GraphConnection>, StartupError> {
        let connector = Arc::clone(&self.collaborators.connector);
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || connector.connect(&settings))
            .await
            .map_err(|e| {
                StartupError::DatabaseConnectFailed(DbError::OpenFailed {
                    target: "database".to_string(),
                    message: e.to_string(),
                })
            })?
            .map_err(StartupError::DatabaseConnectFailed)
    }

    /// Stop accepting, finish in-flight requests, close the connection.
    ///
    /// Safe to call any number of times, concurrently or not; the sequence
    /// runs once and later callers wait for it.
    pub async fn drain(&self) {
        self.drained.get_or_init(|| self.run_drain()).await;
    }

    async fn run_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
        self.set_state(LifecycleState::Draining);
        tracing::info!("Shutting down server");

        let handle = self.server.lock().await.take();
        if let Some(mut handle) = handle {
            if let Some(shutdown) = handle.shutdown.take() {
                let _ = shutdown.send(());
            }
            let timeout = *lock(&self.drain_timeout);
            match tokio::time::timeout(timeout, &mut handle.task).await {
                Ok(Ok(Ok(()))) => tracing::debug!("in-flight requests finished"),
                Ok(Ok(Err(e))) => tracing::warn!("Server exited with error: {}", e),
                Ok(Err(e)) => tracing::warn!("Server task failed: {}", e),
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = timeout.as_secs(),
                        "Drain timed out; closing the connection under remaining requests"
                    );
                    handle.task.abort();
                    let _ = handle.task.await;
                }
            }
        }

        self.close_connection().await;
        self.set_state(LifecycleState::Stopped);
        tracing::info!("Server stopped");
    }

    /// Serve until `signal` resolves or the server exits on its own, then drain.
    pub async fn run_until_shutdown<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let exited = lock(&self.exited).clone();
        let server_exit = async move {
            match exited {
                Some(mut exited) => {
                    let _ = exited.wait_for(|done| *done).await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = signal => tracing::info!("Shutdown signal received"),
            _ = server_exit => tracing::warn!("Server exited unexpectedly"),
        }

        self.drain().await;
    }

    async fn close_connection(&self) {
        let connection = lock(&self.connection).take();
        let Some(connection) = connection else {
            return;
        };
        let result = tokio::task::spawn_blocking(move || connection.close()).await;
        match result {
            Ok(Ok(())) => tracing::info!("Database connection closed"),
            Ok(Err(e)) => tracing::warn!("Failed to close database connection: {}", e),
            Err(e) => tracing::warn!("Database close task failed: {}", e),
        }
    }

    fn set_state(&self, next: LifecycleState) {
        let moved = self.state.send_if_modified(|current| {
            if current.can_move_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(state = ?next, "lifecycle state");
        } else {
            tracing::debug!(state = ?next, current = ?self.state(), "lifecycle transition ignored");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C only on non-unix targets).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
