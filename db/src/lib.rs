//! Graph database layer for graph_gateway - connection trait, backends and URL based selection

pub mod backend;
pub mod config;

#[cfg(all(any(test, feature = "test-utils"), feature = "backend-cozo"))]
pub mod test_utils;

use thiserror::Error;

// Re-export commonly used items
pub use backend::{
    Direction, GraphConnection, GraphNode, PropertyMap, Relationship, validate_identifier,
};
pub use config::{Credentials, DatabaseConfig};

#[cfg(feature = "backend-cozo")]
pub use backend::cozo::CozoGraph;

#[cfg(feature = "backend-age")]
pub use backend::age::AgeGraph;

#[cfg(feature = "backend-bolt")]
pub use backend::bolt::BoltGraph;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to open database '{target}': {message}")]
    OpenFailed { target: String, message: String },

    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    #[error("Invalid identifier '{name}': only ASCII letters, digits and '_' are allowed")]
    InvalidIdentifier { name: String },

    #[error("Unsupported database URL scheme '{scheme}': {hint}")]
    UnsupportedScheme { scheme: String, hint: String },

    #[error("{backend} backend is not enabled in this build")]
    BackendDisabled { backend: &'static str },

    #[error("Database connection is closed")]
    Closed,
}
