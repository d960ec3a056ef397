//! Errors that stop the server before it serves.

use std::net::SocketAddr;

use db::DbError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::lifecycle::LifecycleState;
use crate::schema::{CompileError, MergeError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Missing required configuration: {}", keys.join(", "))]
    MissingConfiguration { keys: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[source] ConfigError),

    #[error("Failed to fetch remote schema {owner}/{repo}/{path}: {source}")]
    RemoteFetchFailed {
        owner: String,
        repo: String,
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("Remote schema not found: no file at '{path}' in repository {owner}/{repo}")]
    RemoteArtifactMissing {
        owner: String,
        repo: String,
        path: String,
    },

    #[error("Failed to read local schema '{path}': {message}")]
    LocalSchemaFailed { path: String, message: String },

    #[error("Failed to merge schema sources: {0}")]
    SchemaMergeConflict(#[from] MergeError),

    #[error("Failed to connect to database: {0}")]
    DatabaseConnectFailed(#[source] DbError),

    #[error("Failed to compile executable schema: {0}")]
    SchemaCompilationFailed(#[from] CompileError),

    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server cannot start from state {state:?}")]
    AlreadyStarted { state: LifecycleState },

    #[error("Startup interrupted by shutdown")]
    Interrupted,
}

impl From<ConfigError> for StartupError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Missing { keys } => Self::MissingConfiguration { keys },
            other => Self::InvalidConfiguration(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_lists_keys() {
        let err = StartupError::from(ConfigError::Missing {
            keys: vec!["DB_URI".to_string(), "PORT".to_string()],
        });
        assert_eq!(err.to_string(), "Missing required configuration: DB_URI, PORT");
    }

    #[test]
    fn test_invalid_config_maps_to_invalid() {
        let err = StartupError::from(ConfigError::Invalid {
            key: "PORT".to_string(),
            value: "http".to_string(),
            reason: "invalid digit found in string".to_string(),
        });
        assert!(matches!(err, StartupError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("'http' for PORT"));
    }

    #[test]
    fn test_artifact_missing_names_location() {
        let err = StartupError::RemoteArtifactMissing {
            owner: "acme".to_string(),
            repo: "schemas".to_string(),
            path: "graph/schema.graphql".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("acme"));
        assert!(message.contains("schemas"));
        assert!(message.contains("graph/schema.graphql"));
    }

    #[test]
    fn test_already_started_names_state() {
        let err = StartupError::AlreadyStarted {
            state: LifecycleState::Stopped,
        };
        assert_eq!(err.to_string(), "Server cannot start from state Stopped");
    }
}
