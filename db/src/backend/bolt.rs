//! Neo4j (Bolt protocol) backend implementation.
//!
//! The driver is async; each connection owns a small runtime and blocks on it,
//! which keeps `GraphConnection` synchronous like the other backends.

use std::collections::HashMap;
use std::sync::RwLock;

use neo4rs::{BoltNull, BoltType, Graph, Row, query};
use serde_json::Value as JsonValue;
use tokio::runtime::Runtime;

use super::cypher::{match_nodes_cypher, node_from_projection, numeric_id, related_nodes_cypher};
use super::{GraphConnection, GraphNode, PropertyMap, Relationship};
use crate::config::{Credentials, redact_userinfo};
use crate::DbError;

/// Projection aliased as `node` in every node query.
const NODE_PROJECTION: &str =
    "{id: id(n), label: head(labels(n)), properties: properties(n)} AS node";

struct Session {
    runtime: Runtime,
    graph: Graph,
}

/// Neo4j backend over Bolt. `None` once the connection has been closed.
pub struct BoltGraph {
    session: RwLock<Option<Session>>,
    target: String,
}

impl BoltGraph {
    /// Connect to `bolt://`, `neo4j://` (or a `+s`/`+ssc` variant) and check
    /// the server answers.
    pub fn connect(uri: &str, credentials: &Credentials) -> Result<Self, DbError> {
        let target = redact_userinfo(uri);
        let open_failed = |message: String| DbError::OpenFailed {
            target: target.clone(),
            message,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("bolt-driver")
            .enable_all()
            .build()
            .map_err(|e| open_failed(format!("Failed to start driver runtime: {}", e)))?;

        let graph = runtime
            .block_on(Graph::new(
                target.as_str(),
                credentials.user.as_str(),
                credentials.password.as_str(),
            ))
            .map_err(|e| open_failed(e.to_string()))?;

        let session = Session { runtime, graph };
        session
            .rows("RETURN 1 AS ok", &PropertyMap::new())
            .map_err(|e| open_failed(e.to_string()))?;

        Ok(Self {
            session: RwLock::new(Some(session)),
            target,
        })
    }

    /// Connection target without credentials.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn with_session<T>(&self, f: impl FnOnce(&Session) -> Result<T, DbError>) -> Result<T, DbError> {
        let guard = self.session.read().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire connection lock: {}", e),
        })?;
        let session = guard.as_ref().ok_or(DbError::Closed)?;
        f(session)
    }

    fn query_nodes(&self, cypher: &str, params: &PropertyMap) -> Result<Vec<GraphNode>, DbError> {
        self.with_session(|session| {
            session
                .rows(cypher, params)?
                .iter()
                .map(|row| {
                    row.get::<JsonValue>("node")
                        .map_err(|e| DbError::QueryFailed {
                            message: format!("Failed to decode node: {}", e),
                        })
                        .and_then(node_from_projection)
                })
                .collect()
        })
    }
}

impl Session {
    fn rows(&self, cypher: &str, params: &PropertyMap) -> Result<Vec<Row>, DbError> {
        let statement = params
            .iter()
            .fold(query(cypher), |statement, (key, value)| {
                statement.param(key, to_bolt(value))
            });

        self.runtime.block_on(async {
            let mut stream = self
                .graph
                .execute(statement)
                .await
                .map_err(|e| DbError::QueryFailed {
                    message: format!("Cypher query failed: {}", e),
                })?;

            let mut rows = Vec::new();
            while let Some(row) = stream.next().await.map_err(|e| DbError::QueryFailed {
                message: format!("Failed to read result row: {}", e),
            })? {
                rows.push(row);
            }
            Ok(rows)
        })
    }
}

impl GraphConnection for BoltGraph {
    fn backend_name(&self) -> &'static str {
        "Neo4jBolt"
    }

    fn verify(&self) -> Result<(), DbError> {
        self.with_session(|session| session.rows("RETURN 1 AS ok", &PropertyMap::new()).map(|_| ()))
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

    /// A single-column row yields its value; wider rows yield a map of columns.
    fn run_statement(
        &self,
        statement: &str,
        params: &PropertyMap,
    ) -> Result<Vec<JsonValue>, DbError> {
        self.with_session(|session| {
            session
                .rows(statement, params)?
                .iter()
                .map(row_value)
                .collect()
        })
    }

    fn close(&self) -> Result<(), DbError> {
        let mut guard = self.session.write().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire connection lock: {}", e),
        })?;
        if let Some(session) = guard.take() {
            drop(session.graph);
            session.runtime.shutdown_background();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.read().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

impl Drop for BoltGraph {
    fn drop(&mut self) {
        // Dropping a runtime inside async code panics; shutting it down does not.
        let session = match self.session.get_mut() {
            Ok(session) => session.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(session) = session {
            drop(session.graph);
            session.runtime.shutdown_background();
        }
    }
}

fn row_value(row: &Row) -> Result<JsonValue, DbError> {
    let mut columns = row.to::<PropertyMap>().map_err(|e| DbError::QueryFailed {
        message: format!("Failed to decode result row: {}", e),
    })?;
    if columns.len() == 1 {
        let key = columns.keys().next().cloned().unwrap_or_default();
        Ok(columns.remove(&key).unwrap_or(JsonValue::Null))
    } else {
        Ok(JsonValue::Object(columns))
    }
}

/// Converts a JSON parameter into its Bolt counterpart.
fn to_bolt(value: &JsonValue) -> BoltType {
    match value {
        JsonValue::Null => BoltType::Null(BoltNull),
        JsonValue::Bool(b) => BoltType::from(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => BoltType::from(s.as_str()),
        JsonValue::Array(items) => BoltType::from(items.iter().map(to_bolt).collect::<Vec<_>>()),
        JsonValue::Object(map) => BoltType::from(
            map.iter()
                .map(|(key, value)| (key.clone(), to_bolt(value)))
                .collect::<HashMap<String, BoltType>>(),
        ),
    }
}
