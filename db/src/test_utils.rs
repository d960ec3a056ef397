//! Shared test fixtures for graph backends.
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! dependent crates.

use std::sync::Arc;

use crate::backend::cozo::CozoGraph;
use crate::backend::{GraphConnection, GraphNode};

/// In-memory graph with two movies, two people and `ACTED_IN` / `DIRECTED` edges.
///
/// ```text
/// (p1:Person {name: "Robert De Niro"}) -[:ACTED_IN]-> (m1:Movie {title: "Heat", released: 1995})
/// (p1)                                 -[:ACTED_IN]-> (m2:Movie {title: "Ronin", released: 1998})
/// (p2:Person {name: "Michael Mann"})   -[:DIRECTED]-> (m1)
/// ```
pub fn movie_graph() -> CozoGraph {
    let graph = CozoGraph::open_mem().expect("Failed to create in-memory graph");

    let nodes = [
        GraphNode::new("m1", "Movie")
            .with_property("title", "Heat")
            .with_property("released", 1995),
        GraphNode::new("m2", "Movie")
            .with_property("title", "Ronin")
            .with_property("released", 1998),
        GraphNode::new("p1", "Person").with_property("name", "Robert De Niro"),
        GraphNode::new("p2", "Person").with_property("name", "Michael Mann"),
    ];
    for node in &nodes {
        graph.put_node(node).expect("Failed to insert node");
    }

    for (src, rel, dst) in [
        ("p1", "ACTED_IN", "m1"),
        ("p1", "ACTED_IN", "m2"),
        ("p2", "DIRECTED", "m1"),
    ] {
        graph.put_edge(src, rel, dst).expect("Failed to insert edge");
    }

    graph
}

/// `movie_graph()` as a shared trait object.
pub fn shared_movie_graph() -> Arc<dyn GraphConnection> {
    Arc::new(movie_graph())
}
