//! Cypher text shared by the Cypher-speaking backends (AGE and Bolt).
//!
//! Labels, edge types and filter keys are spliced into the query text, so
//! each one goes through [`validate_identifier`]. Values always travel as
//! parameters.

use serde_json::Value as JsonValue;

use super::{Direction, GraphNode, PropertyMap, Relationship, validate_identifier};
use crate::DbError;

/// `MATCH (n:Label) WHERE n.k = $k ... RETURN <projection>`
pub(crate) fn match_nodes_cypher(
    label: &str,
    filter: &PropertyMap,
    projection: &str,
) -> Result<String, DbError> {
    validate_identifier(label)?;
    let conditions = filter
        .keys()
        .map(|key| validate_identifier(key).map(|key| format!("n.{key} = ${key}")))
        .collect::<Result<Vec<_>, _>>()?;

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Ok(format!("MATCH (n:{label}){where_clause} RETURN {projection}"))
}

/// One-hop traversal from the node whose id is `$id`.
pub(crate) fn related_nodes_cypher(
    relationship: &Relationship<'_>,
    projection: &str,
) -> Result<String, DbError> {
    let rel = validate_identifier(relationship.rel_type)?;
    let label = validate_identifier(relationship.target_label)?;
    let pattern = match relationship.direction {
        Direction::Out => format!("(a)-[:{rel}]->(n:{label})"),
        Direction::In => format!("(a)<-[:{rel}]-(n:{label})"),
    };
    Ok(format!("MATCH {pattern} WHERE id(a) = $id RETURN {projection}"))
}

/// Parses a numeric node id as both backends number them.
pub(crate) fn numeric_id(node: &GraphNode) -> Result<i64, DbError> {
    node.id.parse().map_err(|_| DbError::QueryFailed {
        message: format!("'{}' is not a numeric node id", node.id),
    })
}

/// Decodes `{id, label, properties}` into a node.
pub(crate) fn node_from_projection(value: JsonValue) -> Result<GraphNode, DbError> {
    let JsonValue::Object(mut map) = value else {
        return Err(DbError::QueryFailed {
            message: format!("Expected node map, got {}", value),
        });
    };
    let id = match map.remove("id") {
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => s,
        other => {
            return Err(DbError::QueryFailed {
                message: format!("Node projection without id: {:?}", other),
            });
        }
    };
    let label = match map.remove("label") {
        Some(JsonValue::String(s)) => s,
        _ => String::new(),
    };
    let properties = match map.remove("properties") {
        Some(JsonValue::Object(props)) => props,
        _ => PropertyMap::new(),
    };
    Ok(GraphNode {
        id,
        label,
        properties,
    })
}
