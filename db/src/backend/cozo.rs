//! CozoDB backend implementation.
//!
//! Stores the property graph in two stored relations, `graph_node` and
//! `graph_edge`, and implements the `GraphConnection` trait on top of them.
//! Node properties are kept as a JSON string and filtered in Rust.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use cozo::{DataValue, DbInstance, NamedRows, Num, ScriptMutability};
use serde_json::Value as JsonValue;

use super::{Direction, GraphConnection, GraphNode, PropertyMap, Relationship};
use crate::DbError;

pub const SCHEMA_GRAPH_NODE: &str = r#"
:create graph_node {
    id: String
    =>
    label: String,
    props: String default "{}"
}
"#;

pub const SCHEMA_GRAPH_EDGE: &str = r#"
:create graph_edge {
    src: String,
    rel: String,
    dst: String
}
"#;

const QUERY_NODES_BY_LABEL: &str = r#"
?[id, props] := *graph_node{id, label, props}, label == $label
"#;

const QUERY_OUTGOING: &str = r#"
?[id, props] :=
    *graph_edge{src, rel, dst: id}, src == $src, rel == $rel,
    *graph_node{id, label, props}, label == $label
"#;

const QUERY_INCOMING: &str = r#"
?[id, props] :=
    *graph_edge{src: id, rel, dst}, dst == $src, rel == $rel,
    *graph_node{id, label, props}, label == $label
"#;

const PUT_NODE: &str = r#"
?[id, label, props] <- [[$id, $label, $props]]
:put graph_node {id => label, props}
"#;

const PUT_EDGE: &str = r#"
?[src, rel, dst] <- [[$src, $rel, $dst]]
:put graph_edge {src, rel, dst}
"#;

/// CozoDB graph store implementing the `GraphConnection` trait.
pub struct CozoGraph {
    inner: RwLock<Option<DbInstance>>,
    backend_name: &'static str,
}

impl CozoGraph {
    /// Opens a CozoDB graph backed by SQLite storage at `path`.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let db = DbInstance::new("sqlite", path, "").map_err(|e| DbError::OpenFailed {
            target: path.display().to_string(),
            message: format!("{:?}", e),
        })?;
        Self::init(db, "CozoSqlite")
    }

    /// Opens an in-memory CozoDB graph.
    pub fn open_mem() -> Result<Self, DbError> {
        let db = DbInstance::new("mem", "", "").map_err(|e| DbError::OpenFailed {
            target: ":memory:".to_string(),
            message: format!("{:?}", e),
        })?;
        Self::init(db, "CozoMem")
    }

    fn init(db: DbInstance, backend_name: &'static str) -> Result<Self, DbError> {
        for schema in [SCHEMA_GRAPH_NODE, SCHEMA_GRAPH_EDGE] {
            try_create_relation(&db, schema)?;
        }
        Ok(Self {
            inner: RwLock::new(Some(db)),
            backend_name,
        })
    }

    /// Inserts or replaces a node.
    pub fn put_node(&self, node: &GraphNode) -> Result<(), DbError> {
        let props = serde_json::to_string(&node.properties).map_err(|e| DbError::QueryFailed {
            message: format!("Failed to encode properties of node '{}': {}", node.id, e),
        })?;
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), DataValue::Str(node.id.clone().into()));
        params.insert("label".to_string(), DataValue::Str(node.label.clone().into()));
        params.insert("props".to_string(), DataValue::Str(props.into()));
        self.run(PUT_NODE, params, ScriptMutability::Mutable)?;
        Ok(())
    }

    /// Inserts an edge `src -[rel]-> dst`.
    pub fn put_edge(&self, src: &str, rel: &str, dst: &str) -> Result<(), DbError> {
        let mut params = BTreeMap::new();
        params.insert("src".to_string(), DataValue::Str(src.into()));
        params.insert("rel".to_string(), DataValue::Str(rel.into()));
        params.insert("dst".to_string(), DataValue::Str(dst.into()));
        self.run(PUT_EDGE, params, ScriptMutability::Mutable)?;
        Ok(())
    }

    fn run(
        &self,
        script: &str,
        params: BTreeMap<String, DataValue>,
        mutability: ScriptMutability,
    ) -> Result<NamedRows, DbError> {
        let guard = self.inner.read().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire read lock: {}", e),
        })?;
        let db = guard.as_ref().ok_or(DbError::Closed)?;
        db.run_script(script, params, mutability)
            .map_err(|e| DbError::QueryFailed {
                message: format!("{:?}", e),
            })
    }

    fn nodes_from_rows(rows: NamedRows, label: &str) -> Result<Vec<GraphNode>, DbError> {
        rows.rows
            .into_iter()
            .map(|row| {
                let id = match row.first() {
                    Some(DataValue::Str(s)) => s.to_string(),
                    other => {
                        return Err(DbError::QueryFailed {
                            message: format!("Unexpected node id value: {:?}", other),
                        });
                    }
                };
                let properties = match row.get(1) {
                    Some(DataValue::Str(s)) => {
                        serde_json::from_str::<PropertyMap>(s).map_err(|e| {
                            DbError::QueryFailed {
                                message: format!("Corrupt properties on node '{}': {}", id, e),
                            }
                        })?
                    }
                    _ => PropertyMap::new(),
                };
                Ok(GraphNode {
                    id,
                    label: label.to_string(),
                    properties,
                })
            })
            .collect()
    }
}

impl GraphConnection for CozoGraph {
    fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    fn verify(&self) -> Result<(), DbError> {
        self.run("?[x] := x = 1", BTreeMap::new(), ScriptMutability::Immutable)?;
        Ok(())
    }

    fn find_nodes(&self, label: &str, filter: &PropertyMap) -> Result<Vec<GraphNode>, DbError> {
        let mut params = BTreeMap::new();
        params.insert("label".to_string(), DataValue::Str(label.into()));
        let rows = self.run(QUERY_NODES_BY_LABEL, params, ScriptMutability::Immutable)?;

        let mut nodes = Self::nodes_from_rows(rows, label)?;
        nodes.retain(|node| node.matches(filter));
        Ok(nodes)
    }

    fn related_nodes(
        &self,
        node: &GraphNode,
        relationship: &Relationship<'_>,
    ) -> Result<Vec<GraphNode>, DbError> {
        let script = match relationship.direction {
            Direction::Out => QUERY_OUTGOING,
            Direction::In => QUERY_INCOMING,
        };
        let mut params = BTreeMap::new();
        params.insert("src".to_string(), DataValue::Str(node.id.clone().into()));
        params.insert("rel".to_string(), DataValue::Str(relationship.rel_type.into()));
        params.insert(
            "label".to_string(),
            DataValue::Str(relationship.target_label.into()),
        );
        let rows = self.run(script, params, ScriptMutability::Immutable)?;
        Self::nodes_from_rows(rows, relationship.target_label)
    }

    fn run_statement(
        &self,
        statement: &str,
        params: &PropertyMap,
    ) -> Result<Vec<JsonValue>, DbError> {
        let cozo_params = params
            .iter()
            .map(|(k, v)| (k.clone(), json_to_data_value(v)))
            .collect();
        let rows = self.run(statement, cozo_params, ScriptMutability::Immutable)?;
        Ok(rows
            .rows
            .into_iter()
            .map(|row| row.first().map(data_value_to_json).unwrap_or(JsonValue::Null))
            .collect())
    }

    fn close(&self) -> Result<(), DbError> {
        let mut guard = self.inner.write().map_err(|e| DbError::QueryFailed {
            message: format!("Failed to acquire write lock: {}", e),
        })?;
        // Dropping the instance releases the storage engine
        guard.take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.read().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

/// Create a stored relation, treating "already exists" as success.
fn try_create_relation(db: &DbInstance, script: &str) -> Result<bool, DbError> {
    match db.run_script(script, BTreeMap::new(), ScriptMutability::Mutable) {
        Ok(_) => Ok(true),
        Err(e) => {
            let err_str = format!("{:?}", e);
            if err_str.contains("AlreadyExists") || err_str.contains("stored_relation_conflict") {
                Ok(false)
            } else {
                Err(DbError::QueryFailed { message: err_str })
            }
        }
    }
}

/// Converts a JSON parameter to CozoDB's value type.
fn json_to_data_value(value: &JsonValue) -> DataValue {
    match value {
        JsonValue::Null => DataValue::Null,
        JsonValue::Bool(b) => DataValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => DataValue::Num(Num::Int(i)),
            None => DataValue::Num(Num::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        JsonValue::String(s) => DataValue::Str(s.clone().into()),
        JsonValue::Array(items) => DataValue::List(items.iter().map(json_to_data_value).collect()),
        JsonValue::Object(_) => DataValue::Str(value.to_string().into()),
    }
}

/// Converts a CozoDB value to JSON. Types with no JSON counterpart are rendered with Debug.
fn data_value_to_json(value: &DataValue) -> JsonValue {
    match value {
        DataValue::Null => JsonValue::Null,
        DataValue::Bool(b) => JsonValue::Bool(*b),
        DataValue::Num(Num::Int(i)) => JsonValue::from(*i),
        DataValue::Num(Num::Float(f)) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        DataValue::Str(s) => JsonValue::String(s.to_string()),
        DataValue::List(items) => JsonValue::Array(items.iter().map(data_value_to_json).collect()),
        other => JsonValue::String(format!("{:?}", other)),
    }
}
