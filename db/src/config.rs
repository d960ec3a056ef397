//! Database configuration for runtime backend selection.
//!
//! Parses a database URI into a backend choice and opens a shared connection.
//! Supports CozoDB (SQLite or in-memory), PostgreSQL with Apache AGE and
//! Neo4j over Bolt.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::DbError;
use crate::backend::GraphConnection;

/// URL schemes served by the Bolt backend.
pub const BOLT_SCHEMES: [&str; 6] = ["bolt", "bolt+s", "bolt+ssc", "neo4j", "neo4j+s", "neo4j+ssc"];

/// Default AGE graph name when none is configured.
pub const DEFAULT_GRAPH_NAME: &str = "graph";

/// Database user and password.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for database backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// Local CozoDB with SQLite storage.
    CozoSqlite { path: PathBuf },

    /// Local CozoDB with in-memory storage.
    CozoMem,

    /// PostgreSQL with the Apache AGE extension.
    PostgresAge { uri: String, graph_name: String },

    /// Neo4j over the Bolt protocol.
    Bolt { uri: String },
}

impl DatabaseConfig {
    /// Parse from a connection URL or file path.
    ///
    /// Supported formats:
    /// - `:memory:` or `mem://` → CozoMem
    /// - `sqlite:///path/to/db` → CozoSqlite
    /// - `./path/to/db.sqlite` or `/absolute/path` → CozoSqlite
    /// - `postgres://host:port/db` or `postgresql://...` → PostgresAge
    /// - `bolt://`, `neo4j://` and their `+s`/`+ssc` variants → Bolt
    pub fn from_url(url: &str, graph_name: Option<&str>) -> Result<Self, DbError> {
        // Memory database
        if url == ":memory:" || url == "mem://" {
            return Ok(Self::CozoMem);
        }

        // URL-style connection strings
        if let Some(path) = url.strip_prefix("sqlite://") {
            return Ok(Self::CozoSqlite {
                path: PathBuf::from(path),
            });
        }

        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::PostgresAge {
                uri: url.to_string(),
                graph_name: graph_name.unwrap_or(DEFAULT_GRAPH_NAME).to_string(),
            });
        }

        if let Some((scheme, _)) = url.split_once("://") {
            if BOLT_SCHEMES.contains(&scheme) {
                return Ok(Self::Bolt {
                    uri: url.to_string(),
                });
            }
            return Err(DbError::UnsupportedScheme {
                scheme: scheme.to_string(),
                hint: "expected bolt://, neo4j://, postgres://, sqlite://, mem:// or :memory:"
                    .to_string(),
            });
        }

        // Default: treat as file path (CozoSqlite)
        Ok(Self::CozoSqlite {
            path: PathBuf::from(url),
        })
    }

    /// Create a shared connection from this configuration.
    ///
    /// Credentials are only used by backends that authenticate.
    #[cfg_attr(
        not(any(feature = "backend-age", feature = "backend-bolt")),
        allow(unused_variables)
    )]
    pub fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn GraphConnection>, DbError> {
        let connection: Arc<dyn GraphConnection> = match self {
            #[cfg(feature = "backend-cozo")]
            Self::CozoSqlite { path } => Arc::new(crate::backend::cozo::CozoGraph::open(path)?),
            #[cfg(feature = "backend-cozo")]
            Self::CozoMem => Arc::new(crate::backend::cozo::CozoGraph::open_mem()?),
            #[cfg(feature = "backend-age")]
            Self::PostgresAge { uri, graph_name } => Arc::new(
                crate::backend::age::AgeGraph::connect(uri, credentials, graph_name)?,
            ),
            #[cfg(feature = "backend-bolt")]
            Self::Bolt { uri } => Arc::new(crate::backend::bolt::BoltGraph::connect(uri, credentials)?),
            #[allow(unreachable_patterns)]
            other => {
                return Err(DbError::BackendDisabled {
                    backend: other.backend_label(),
                });
            }
        };

        tracing::info!(
            backend = connection.backend_name(),
            target = %self.display_target(),
            "database connection opened"
        );
        Ok(connection)
    }

    /// Backend name used in logs and errors.
    pub fn backend_label(&self) -> &'static str {
        match self {
            Self::CozoSqlite { .. } => "CozoSqlite",
            Self::CozoMem => "CozoMem",
            Self::PostgresAge { .. } => "PostgresAge",
            Self::Bolt { .. } => "Neo4jBolt",
        }
    }

    /// Connection target safe for logging (no userinfo).
    pub fn display_target(&self) -> String {
        match self {
            Self::CozoSqlite { path } => path.display().to_string(),
            Self::CozoMem => ":memory:".to_string(),
            Self::PostgresAge { uri, graph_name } => {
                format!("{} (graph {})", redact_userinfo(uri), graph_name)
            }
            Self::Bolt { uri } => redact_userinfo(uri),
        }
    }
}

/// Strip `user:pass@` from a URL.
pub(crate) fn redact_userinfo(uri: &str) -> String {
    match uri.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, tail) = match rest.find('/') {
                Some(idx) => rest.split_at(idx),
                None => (rest, ""),
            };
            let host = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
            format!("{}://{}{}", scheme, host, tail)
        }
        None => uri.to_string(),
    }
}
