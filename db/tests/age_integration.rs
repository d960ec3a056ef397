//! Integration tests for the PostgreSQL + Apache AGE backend.
//!
//! These tests require a PostgreSQL instance with the AGE extension.
//! Run with: cargo test -p db --features postgres-tests
//!
//! Prerequisites:
//! 1. PostgreSQL with AGE extension installed
//! 2. Create test database: `createdb -U postgres graph_gateway_test`
//! 3. Optionally point `AGE_TEST_URL` at it (default below)

#![cfg(feature = "postgres-tests")]

use db::{AgeGraph, Credentials, DatabaseConfig, Direction, GraphConnection, PropertyMap, Relationship};
use serde_json::json;

const DEFAULT_URL: &str = "postgres://localhost:5432/graph_gateway_test";
const GRAPH_NAME: &str = "gateway_test_graph";

fn url() -> String {
    std::env::var("AGE_TEST_URL").unwrap_or_else(|_| DEFAULT_URL.to_string())
}

fn credentials() -> Credentials {
    Credentials::new(
        std::env::var("AGE_TEST_USER").unwrap_or_else(|_| "postgres".to_string()),
        std::env::var("AGE_TEST_PASS").unwrap_or_default(),
    )
}

/// Connect and reset the test graph to two nodes and one edge.
fn seeded_graph() -> AgeGraph {
    let graph = AgeGraph::connect(&url(), &credentials(), GRAPH_NAME).expect("Failed to connect to AGE");
    graph
        .run_statement("MATCH (n) DETACH DELETE n RETURN 0", &PropertyMap::new())
        .expect("Failed to clear graph");
    graph
        .run_statement(
            "CREATE (:Person {name: 'Al Pacino'})-[:ACTED_IN]->(m:Movie {title: 'Heat'}) RETURN m.title",
            &PropertyMap::new(),
        )
        .expect("Failed to seed graph");
    graph
}

#[test]
fn test_connect_via_database_config() {
    let config = DatabaseConfig::from_url(&url(), Some(GRAPH_NAME)).unwrap();
    let connection = config.connect(&credentials()).expect("Failed to connect");
    assert_eq!(connection.backend_name(), "PostgresAge");
    connection.verify().expect("AGE should be loaded");
    connection.close().unwrap();
    assert!(connection.is_closed());
}

#[test]
fn test_find_and_traverse() {
    let graph = seeded_graph();

    let mut filter = PropertyMap::new();
    filter.insert("name".to_string(), json!("Al Pacino"));
    let people = graph.find_nodes("Person", &filter).unwrap();
    assert_eq!(people.len(), 1);

    let movies = graph
        .related_nodes(
            &people[0],
            &Relationship {
                rel_type: "ACTED_IN",
                direction: Direction::Out,
                target_label: "Movie",
            },
        )
        .unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].property("title"), Some(&json!("Heat")));
}

#[test]
fn test_run_statement_with_params() {
    let graph = seeded_graph();
    let mut params = PropertyMap::new();
    params.insert("title".to_string(), json!("Heat"));

    let names = graph
        .run_statement(
            "MATCH (p:Person)-[:ACTED_IN]->(m:Movie) WHERE m.title = $title RETURN p.name",
            &params,
        )
        .unwrap();
    assert_eq!(names, vec![json!("Al Pacino")]);
}
