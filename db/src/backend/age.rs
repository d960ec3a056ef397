//! PostgreSQL with Apache AGE backend implementation.
//!
//! This module provides a graph backend using PostgreSQL with the Apache AGE
//! graph extension, translating `GraphConnection` calls into Cypher.

use std::sync::Mutex;

use apache_age::sync::{AgeClient, Client};
use apache_age::{AgType, NoTls};
use serde_json::Value as JsonValue;

use super::cypher::{match_nodes_cypher, node_from_projection, numeric_id, related_nodes_cypher};
use super::{GraphConnection, GraphNode, PropertyMap, Relationship, validate_identifier};
use crate::config::{Credentials, redact_userinfo};
use crate::DbError;

/// Cypher projection shared by every node query.
const NODE_PROJECTION: &str = "{id: id(n), label: label(n), properties: properties(n)}";

/// PostgreSQL backend using Apache AGE for graph queries.
///
/// The client is not `Sync`; it is guarded by a mutex and used serially.
/// `None` once the connection has been closed.
pub struct AgeGraph {
    client: Mutex<Option<Client>>,
    graph_name: String,
}

impl AgeGraph {
    /// Connect to PostgreSQL, load AGE and make sure the graph exists.
    ///
    /// # Arguments
    /// * `uri` - `postgres://host:port/db` URL or libpq key/value string
    /// * `credentials` - user and password, overriding any in the URI
    /// * `graph_name` - Name of the AGE graph to use
    ///
    /// # Errors
    /// Returns an error if:
    /// - Connection fails
    /// - AGE extension is not installed
    /// - The graph cannot be created
    pub fn connect(uri: &str, credentials: &Credentials, graph_name: &str) -> Result<Self, DbError> {
        validate_identifier(graph_name)?;
        let connection_string = connection_string(uri, credentials)?;

        let mut client = Client::connect_age(&connection_string, NoTls).map_err(|e| {
            DbError::OpenFailed {
                target: redact_userinfo(uri),
                message: e.to_string(),
            }
        })?;

        Self::verify_age_extension(&mut client)?;

        if !Self::graph_exists(&mut client, graph_name)? {
            client
                .create_graph(graph_name)
                .map_err(|e| DbError::QueryFailed {
                    message: format!("Failed to create graph '{}': {}", graph_name, e),
                })?;
            tracing::info!(graph = graph_name, "created AGE graph");
        }

        Ok(Self {
            client: Mutex::new(Some(client)),
            graph_name: graph_name.to_string(),
        })
    }

    /// Get the graph name for this backend.
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    /// Verify that the AGE extension is installed and loaded.
    fn verify_age_extension(client: &mut Client) -> Result<(), DbError> {
        match client.simple_query("SELECT * FROM ag_catalog.ag_graph LIMIT 1") {
            Ok(_) => Ok(()),
            Err(e) => {
                let err_str = e.to_string();
                let message = if err_str.contains("ag_catalog") || err_str.contains("does not exist") {
                    "Apache AGE extension is not installed or not loaded. \
                     Please run: CREATE EXTENSION IF NOT EXISTS age; LOAD 'age';"
                        .to_string()
                } else {
                    format!("Failed to verify AGE extension: {}", err_str)
                };
                Err(DbError::QueryFailed { message })
            }
        }
    }

    /// Check if a graph with the given name exists.
    fn graph_exists(client: &mut Client, graph_name: &str) -> Result<bool, DbError> {
        let row = client
            .query_opt(
                "SELECT 1 FROM ag_catalog.ag_graph WHERE name = $1",
                &[&graph_name],
            )
            .map_err(|e| DbError::QueryFailed {
                message: e.to_string(),
            })?;
        Ok(row.is_some())
    }

    /// Run a Cypher query returning one agtype column per row.
    fn query(&self, cypher: &str, params: &PropertyMap) -> Result<Vec<JsonValue>, DbError> {
        let mut guard = self.client.lock().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire connection lock: {}", e),
        })?;
        let client = guard.as_mut().ok_or(DbError::Closed)?;

        let agtype = if params.is_empty() {
            None
        } else {
            Some(AgType(JsonValue::Object(params.clone())))
        };

        let rows = client
            .query_cypher::<JsonValue>(&self.graph_name, cypher, agtype)
            .map_err(|e| DbError::QueryFailed {
                message: format!("Cypher query failed: {}", e),
            })?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, AgType<JsonValue>>(0)
                    .map(|value| value.0)
                    .map_err(|e| DbError::QueryFailed {
                        message: format!("Failed to decode agtype column: {}", e),
                    })
            })
            .collect()
    }

    fn query_nodes(&self, cypher: &str, params: &PropertyMap) -> Result<Vec<GraphNode>, DbError> {
        self.query(cypher, params)?
            .into_iter()
            .map(node_from_projection)
            .collect()
    }
}

impl GraphConnection for AgeGraph {
    fn backend_name(&self) -> &'static str {
        "PostgresAge"
    }

    fn verify(&self) -> Result<(), DbError> {
        let mut guard = self.client.lock().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire connection lock: {}", e),
        })?;
        let client = guard.as_mut().ok_or(DbError::Closed)?;
        Self::verify_age_extension(client)
    }

    fn find_nodes(&self, label: &str, filter: &PropertyMap) -> Result<Vec<GraphNode>, DbError> {
        let cypher = match_nodes_cypher(label, filter, NODE_PROJECTION)?;
        self.query_nodes(&cypher, filter)
    }

    fn related_nodes(
        &self,
        node: &GraphNode,
        relationship: &Relationship<'_>,
    ) -> Result<Vec<GraphNode>, DbError> {
        let cypher = related_nodes_cypher(relationship, NODE_PROJECTION)?;
        let mut params = PropertyMap::new();
        params.insert("id".to_string(), JsonValue::from(numeric_id(node)?));
        self.query_nodes(&cypher, &params)
    }

    fn run_statement(
        &self,
        statement: &str,
        params: &PropertyMap,
    ) -> Result<Vec<JsonValue>, DbError> {
        self.query(statement, params)
    }

    fn close(&self) -> Result<(), DbError> {
        let mut guard = self.client.lock().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire connection lock: {}", e),
        })?;
        match guard.take() {
            Some(client) => client.close().map_err(|e| DbError::QueryFailed {
                message: format!("Failed to close connection: {}", e),
            }),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.client.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

/// Build a libpq key/value connection string with explicit credentials.
///
/// Accepts either a `postgres://` / `postgresql://` URL or a key/value string.
/// Credentials embedded in the URL are replaced by `credentials`.
pub fn connection_string(uri: &str, credentials: &Credentials) -> Result<String, DbError> {
    let mut pairs: Vec<(String, String)> = Vec::new();

    let url_body = uri
        .strip_prefix("postgres://")
        .or_else(|| uri.strip_prefix("postgresql://"));

    match url_body {
        Some(body) => {
            let (body, query) = match body.split_once('?') {
                Some((b, q)) => (b, Some(q)),
                None => (body, None),
            };
            let (authority, dbname) = match body.split_once('/') {
                Some((a, d)) => (a, Some(d)),
                None => (body, None),
            };
            // Drop any userinfo; explicit credentials win
            let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
            let (host, port) = match host_port.rsplit_once(':') {
                Some((h, p)) if !h.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
                    (h, Some(p))
                }
                _ => (host_port, None),
            };
            if host.is_empty() {
                return Err(DbError::OpenFailed {
                    target: redact_userinfo(uri),
                    message: "missing host".to_string(),
                });
            }
            pairs.push(("host".to_string(), host.to_string()));
            if let Some(port) = port {
                pairs.push(("port".to_string(), port.to_string()));
            }
            if let Some(dbname) = dbname.filter(|d| !d.is_empty()) {
                pairs.push(("dbname".to_string(), dbname.to_string()));
            }
            for option in query.into_iter().flat_map(|q| q.split('&')) {
                if let Some((key, value)) = option.split_once('=') {
                    pairs.push((key.to_string(), value.to_string()));
                }
            }
        }
        None => {
            let mut rendered = uri.trim().to_string();
            rendered.push_str(&format!(
                " user={} password={}",
                quote_value(&credentials.user),
                quote_value(&credentials.password)
            ));
            return Ok(rendered);
        }
    }

    pairs.push(("user".to_string(), credentials.user.clone()));
    pairs.push(("password".to_string(), credentials.password.clone()));

    Ok(pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, quote_value(v)))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Quote a libpq key/value parameter value.
fn quote_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
