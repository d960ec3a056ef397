//! Compiling a canonical schema document into an executable schema.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::ast::{Definition, OperationType};
use async_graphql::dynamic::Schema;
use async_trait::async_trait;
use db::{DbError, GraphConnection};
use thiserror::Error;

use super::merge::CanonicalSchemaDocument;
use super::resolve;
use crate::observability::{Observability, ObservabilityExtension};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Schema validation failed:\n{0}")]
    Invalid(String),

    #[error("Schema has no query root type '{0}'")]
    MissingQueryRoot(String),

    #[error("Database verification failed: {0}")]
    Database(#[from] DbError),

    #[error("Failed to build executable schema: {0}")]
    Build(String),
}

/// Options applied while building the executable schema.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Allow `__schema` / `__type` queries
    pub introspection: bool,

    /// Hooks installed on every request
    pub observability: Observability,
}

/// A query-ready schema bound to a database connection. Cheap to clone.
#[derive(Clone)]
pub struct ExecutableSchema {
    schema: Schema,
    introspection: bool,
}

impl ExecutableSchema {
    pub async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response {
        self.schema.execute(request).await
    }

    pub fn introspection_enabled(&self) -> bool {
        self.introspection
    }

    /// SDL of the executable schema as async-graphql sees it.
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }
}

impl fmt::Debug for ExecutableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableSchema")
            .field("introspection", &self.introspection)
            .finish_non_exhaustive()
    }
}

/// Turns a schema document plus a live connection into an executable schema.
#[async_trait]
pub trait SchemaCompiler: Send + Sync {
    async fn compile(
        &self,
        document: &CanonicalSchemaDocument,
        connection: Arc<dyn GraphConnection>,
        options: &CompileOptions,
    ) -> Result<ExecutableSchema, CompileError>;
}

/// Directive definitions the resolvers understand, added for validation when
/// the document does not define them itself.
const GRAPH_DIRECTIVES: [(&str, &str); 2] = [
    ("cypher", "directive @cypher(statement: String!) on FIELD_DEFINITION"),
    (
        "relationship",
        "directive @relationship(type: String!, direction: RelationshipDirection = OUT) on FIELD_DEFINITION",
    ),
];

const RELATIONSHIP_DIRECTION: (&str, &str) = ("RelationshipDirection", "enum RelationshipDirection { IN OUT }");

/// Resolves fields against a [`GraphConnection`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphSchemaCompiler;

#[async_trait]
impl SchemaCompiler for GraphSchemaCompiler {
    async fn compile(
        &self,
        document: &CanonicalSchemaDocument,
        connection: Arc<dyn GraphConnection>,
        options: &CompileOptions,
    ) -> Result<ExecutableSchema, CompileError> {
        let roots = RootTypes::of(document)?;
        validate(document)?;

        let verifier = Arc::clone(&connection);
        tokio::task::spawn_blocking(move || verifier.verify())
            .await
            .map_err(|e| CompileError::Build(format!("verification task failed: {}", e)))??;

        let mut root_names = vec![roots.query.as_str()];
        root_names.extend(roots.mutation.as_deref());

        let builder = Schema::build(&roots.query, roots.mutation.as_deref(), None);
        let builder = resolve::register_types(builder, document.document(), &root_names, &connection)
            .extension(ObservabilityExtension::new(options.observability.clone()));
        let builder = if options.introspection {
            builder
        } else {
            builder.disable_introspection()
        };

        let schema = builder
            .finish()
            .map_err(|e| CompileError::Build(e.to_string()))?;

        tracing::debug!(
            types = document.type_names().len(),
            introspection = options.introspection,
            "executable schema built"
        );

        Ok(ExecutableSchema {
            schema,
            introspection: options.introspection,
        })
    }
}

/// Validate the document, with the graph directives in scope.
fn validate(document: &CanonicalSchemaDocument) -> Result<(), CompileError> {
    let sdl = with_graph_directives(document);
    apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
        .map(|_| ())
        .map_err(|e| CompileError::Invalid(e.errors.to_string()))
}

fn with_graph_directives(document: &CanonicalSchemaDocument) -> String {
    let defines_directive = |name: &str| {
        document.document().definitions.iter().any(|definition| {
            matches!(definition, Definition::DirectiveDefinition(def) if def.name.as_str() == name)
        })
    };

    let mut sdl = String::new();
    for (name, definition) in GRAPH_DIRECTIVES {
        if !defines_directive(name) {
            sdl.push_str(definition);
            sdl.push('\n');
            if name == "relationship" && !document.type_names().contains(&RELATIONSHIP_DIRECTION.0) {
                sdl.push_str(RELATIONSHIP_DIRECTION.1);
                sdl.push('\n');
            }
        }
    }
    sdl.push_str(document.sdl());
    sdl
}

struct RootTypes {
    query: String,
    mutation: Option<String>,
}

impl RootTypes {
    fn of(document: &CanonicalSchemaDocument) -> Result<Self, CompileError> {
        let types = document.type_names();
        let mut query = None;
        let mut mutation = None;

        for definition in &document.document().definitions {
            if let Definition::SchemaDefinition(def) = definition {
                for root in &def.root_operations {
                    let (operation, named_type) = &**root;
                    match operation {
                        OperationType::Query => query = Some(named_type.to_string()),
                        OperationType::Mutation => mutation = Some(named_type.to_string()),
                        OperationType::Subscription => {
                            tracing::warn!(
                                root = %named_type,
                                "subscription root is not served"
                            );
                        }
                    }
                }
            }
        }

        let query = query.unwrap_or_else(|| "Query".to_string());
        if !types.contains(&query.as_str()) {
            return Err(CompileError::MissingQueryRoot(query));
        }
        let mutation = mutation.or_else(|| {
            types
                .contains(&"Mutation")
                .then(|| "Mutation".to_string())
        });

        Ok(Self { query, mutation })
    }
}
