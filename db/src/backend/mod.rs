//! Backend abstraction layer for graph database operations.
//!
//! This module provides the trait every graph backend implements, allowing the
//! server to resolve GraphQL fields against CozoDB, PostgreSQL/AGE or Neo4j
//! through the same interface.

use serde_json::Value as JsonValue;

use crate::DbError;

/// Node and parameter properties, keyed by property name.
pub type PropertyMap = serde_json::Map<String, JsonValue>;

/// A labelled node read from the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Backend-specific node identifier
    pub id: String,

    /// Node label (matches a GraphQL object type name)
    pub label: String,

    /// Node properties
    pub properties: PropertyMap,
}

impl GraphNode {
    /// Creates a node with no properties.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: PropertyMap::new(),
        }
    }

    /// Adds a property, returning the node for chaining.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns a property by name.
    pub fn property(&self, name: &str) -> Option<&JsonValue> {
        self.properties.get(name)
    }

    /// True when every filter entry equals the node's property of the same name.
    pub fn matches(&self, filter: &PropertyMap) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.properties.get(key) == Some(expected))
    }
}

/// Edge direction relative to the node being traversed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    /// Parses `OUT` / `IN` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("OUT") {
            Some(Self::Out)
        } else if s.eq_ignore_ascii_case("IN") {
            Some(Self::In)
        } else {
            None
        }
    }
}

/// Describes one hop from a node to its neighbours.
#[derive(Debug, Clone, Copy)]
pub struct Relationship<'a> {
    /// Edge type (e.g. "ACTED_IN")
    pub rel_type: &'a str,

    /// Which way the edge points
    pub direction: Direction,

    /// Label the neighbour must carry
    pub target_label: &'a str,
}

/// Core trait for graph database operations.
///
/// Methods are synchronous, matching the underlying driver crates; async
/// callers run them on a blocking thread. Implementations must be
/// thread-safe (Send + Sync) since one connection serves every request.
pub trait GraphConnection: Send + Sync {
    /// Returns the backend name for logging/debugging.
    fn backend_name(&self) -> &'static str;

    /// Checks that the database is reachable and usable.
    fn verify(&self) -> Result<(), DbError>;

    /// Returns every node with `label` whose properties match `filter`.
    fn find_nodes(&self, label: &str, filter: &PropertyMap) -> Result<Vec<GraphNode>, DbError>;

    /// Returns the neighbours of `node` reached through `relationship`.
    fn related_nodes(
        &self,
        node: &GraphNode,
        relationship: &Relationship<'_>,
    ) -> Result<Vec<GraphNode>, DbError>;

    /// Runs a statement in the backend's native query language.
    ///
    /// Returns the first column of every result row.
    fn run_statement(&self, statement: &str, params: &PropertyMap)
    -> Result<Vec<JsonValue>, DbError>;

    /// Releases the connection. Later calls fail with `DbError::Closed`.
    fn close(&self) -> Result<(), DbError>;

    /// True once `close` has run.
    fn is_closed(&self) -> bool;
}

/// Rejects names that cannot be spliced into a query as a label, edge type or key.
pub fn validate_identifier(name: &str) -> Result<&str, DbError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

#[cfg(feature = "backend-cozo")]
pub mod cozo;

#[cfg(feature = "backend-age")]
pub mod age;

#[cfg(feature = "backend-bolt")]
pub mod bolt;

#[cfg(any(feature = "backend-age", feature = "backend-bolt"))]
mod cypher;
