//! HTTP transport: GraphQL over JSON plus a health check.

use async_graphql::{Request, Response};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::schema::ExecutableSchema;

pub fn router(schema: ExecutableSchema) -> Router {
    Router::new()
        .route("/graphql", post(graphql))
        .route("/health", get(health))
        .with_state(schema)
}

async fn graphql(State(schema): State<ExecutableSchema>, Json(request): Json<Request>) -> Json<Response> {
    Json(schema.execute(request).await)
}

async fn health() -> &'static str {
    "ok"
}
