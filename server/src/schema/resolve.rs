//! Field resolution over a graph connection.
//!
//! Every field is planned once when the schema is built:
//!
//! - `@cypher(statement:)` runs the statement with the field arguments as parameters
//! - root fields returning object types look up nodes by label
//! - `@relationship(type:, direction:)` fields traverse edges from the parent node
//! - scalar and enum fields read the parent node's property of the same name
//!
//! Anything else resolves to null.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::ast::{self, Definition};
use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Interface,
    InterfaceField, Object, ResolverContext, Scalar, SchemaBuilder, TypeRef, Union,
};
use async_graphql::{Name, Number, Value};
use db::{DbError, Direction, GraphConnection, GraphNode, PropertyMap, Relationship};
use serde_json::Value as JsonValue;

pub(crate) const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Scalar,
    Enum,
    Object,
    /// Interface or union, with the object types it can resolve to
    Abstract(Vec<String>),
    Input,
}

/// What each named type is, as far as resolution cares.
struct TypeCatalog {
    kinds: HashMap<String, Kind>,
}

impl TypeCatalog {
    fn new(document: &ast::Document) -> Self {
        let mut kinds = HashMap::new();
        let mut implementers: HashMap<String, Vec<String>> = HashMap::new();

        for definition in &document.definitions {
            match definition {
                Definition::ScalarTypeDefinition(def) => {
                    kinds.insert(def.name.to_string(), Kind::Scalar);
                }
                Definition::EnumTypeDefinition(def) => {
                    kinds.insert(def.name.to_string(), Kind::Enum);
                }
                Definition::ObjectTypeDefinition(def) => {
                    kinds.insert(def.name.to_string(), Kind::Object);
                    for interface in &def.implements_interfaces {
                        implementers
                            .entry(interface.to_string())
                            .or_default()
                            .push(def.name.to_string());
                    }
                }
                Definition::InterfaceTypeDefinition(def) => {
                    kinds.insert(def.name.to_string(), Kind::Abstract(Vec::new()));
                }
                Definition::UnionTypeDefinition(def) => {
                    let mut members: Vec<String> = def.members.iter().map(|m| m.to_string()).collect();
                    members.sort();
                    kinds.insert(def.name.to_string(), Kind::Abstract(members));
                }
                Definition::InputObjectTypeDefinition(def) => {
                    kinds.insert(def.name.to_string(), Kind::Input);
                }
                _ => {}
            }
        }

        for (interface, mut objects) in implementers {
            if let Some(Kind::Abstract(possible)) = kinds.get_mut(&interface) {
                objects.sort();
                *possible = objects;
            }
        }

        Self { kinds }
    }

    fn kind(&self, name: &str) -> Option<Kind> {
        if BUILTIN_SCALARS.contains(&name) {
            return Some(Kind::Scalar);
        }
        self.kinds.get(name).cloned()
    }
}

/// How values produced by a statement are turned into field values.
#[derive(Debug, Clone, PartialEq)]
enum Output {
    Values { list: bool, enum_output: bool },
    Nodes { label: String, tag: bool, list: bool },
}

#[derive(Debug, Clone, PartialEq)]
enum FieldPlan {
    Statement {
        statement: String,
        output: Output,
    },
    Lookup {
        labels: Vec<String>,
        tag: bool,
        list: bool,
    },
    Traverse {
        rel_type: String,
        direction: Direction,
        labels: Vec<String>,
        tag: bool,
        list: bool,
    },
    Property {
        name: String,
        enum_output: bool,
    },
    Null,
}

fn plan_field(catalog: &TypeCatalog, field: &ast::FieldDefinition, root: bool) -> FieldPlan {
    let named = field.ty.inner_named_type().as_str();
    let list = field.ty.is_list();
    let kind = catalog.kind(named);
    let enum_output = kind == Some(Kind::Enum);

    if let Some(statement) = directive_argument(&field.directives, "cypher", "statement").and_then(value_text) {
        let output = match &kind {
            Some(Kind::Object) => Output::Nodes {
                label: named.to_string(),
                tag: false,
                list,
            },
            Some(Kind::Abstract(_)) => Output::Nodes {
                label: named.to_string(),
                tag: true,
                list,
            },
            _ => Output::Values { list, enum_output },
        };
        return FieldPlan::Statement {
            statement: statement.to_string(),
            output,
        };
    }

    let (labels, tag) = match kind {
        Some(Kind::Scalar) | Some(Kind::Enum) if !root => {
            return FieldPlan::Property {
                name: field.name.to_string(),
                enum_output,
            };
        }
        Some(Kind::Object) => (vec![named.to_string()], false),
        Some(Kind::Abstract(possible)) => (possible, true),
        _ => return FieldPlan::Null,
    };

    if root {
        return FieldPlan::Lookup { labels, tag, list };
    }

    let rel_type = directive_argument(&field.directives, "relationship", "type").and_then(value_text);
    match rel_type {
        Some(rel_type) => {
            let direction = directive_argument(&field.directives, "relationship", "direction")
                .and_then(value_text)
                .and_then(Direction::parse)
                .unwrap_or(Direction::Out);
            FieldPlan::Traverse {
                rel_type: rel_type.to_string(),
                direction,
                labels,
                tag,
                list,
            }
        }
        None => FieldPlan::Null,
    }
}

fn directive_argument<'d>(
    directives: &'d ast::DirectiveList,
    directive: &str,
    argument: &str,
) -> Option<&'d ast::Value> {
    directives
        .0
        .iter()
        .find(|d| d.name.as_str() == directive)?
        .arguments
        .iter()
        .find(|a| a.name.as_str() == argument)
        .map(|a| &*a.value)
}

fn value_text(value: &ast::Value) -> Option<&str> {
    match value {
        ast::Value::String(s) => Some(s.as_str()),
        ast::Value::Enum(name) => Some(name.as_str()),
        _ => None,
    }
}

/// Register every type of `document` on `builder`, with resolvers bound to `connection`.
///
/// Built-in scalars are left to async-graphql.
pub(crate) fn register_types(
    mut builder: SchemaBuilder,
    document: &ast::Document,
    roots: &[&str],
    connection: &Arc<dyn GraphConnection>,
) -> SchemaBuilder {
    let catalog = TypeCatalog::new(document);

    for definition in &document.definitions {
        builder = match definition {
            Definition::ObjectTypeDefinition(def) => {
                let root = roots.contains(&def.name.as_str());
                let mut object = Object::new(def.name.as_str());
                if let Some(description) = &def.description {
                    object = object.description(&**description);
                }
                for interface in &def.implements_interfaces {
                    object = object.implement(interface.as_str());
                }
                for field in &def.fields {
                    object = object.field(resolved_field(&catalog, field, root, connection));
                }
                builder.register(object)
            }
            Definition::InterfaceTypeDefinition(def) => {
                let mut interface = Interface::new(def.name.as_str());
                if let Some(description) = &def.description {
                    interface = interface.description(&**description);
                }
                for field in &def.fields {
                    let mut output = InterfaceField::new(field.name.as_str(), type_ref(&field.ty));
                    for argument in &field.arguments {
                        output = output.argument(input_value(argument));
                    }
                    interface = interface.field(output);
                }
                builder.register(interface)
            }
            Definition::UnionTypeDefinition(def) => {
                let mut union = Union::new(def.name.as_str());
                for member in &def.members {
                    union = union.possible_type(member.as_str());
                }
                builder.register(union)
            }
            Definition::EnumTypeDefinition(def) => {
                let mut enumeration = Enum::new(def.name.as_str());
                for value in &def.values {
                    enumeration = enumeration.item(EnumItem::new(value.value.as_str()));
                }
                builder.register(enumeration)
            }
            Definition::InputObjectTypeDefinition(def) => {
                let mut input = InputObject::new(def.name.as_str());
                for field in &def.fields {
                    input = input.field(input_value(field));
                }
                builder.register(input)
            }
            Definition::ScalarTypeDefinition(def)
                if !BUILTIN_SCALARS.contains(&def.name.as_str()) =>
            {
                builder.register(Scalar::new(def.name.as_str()))
            }
            _ => builder,
        };
    }

    builder
}

fn resolved_field(
    catalog: &TypeCatalog,
    field: &ast::FieldDefinition,
    root: bool,
    connection: &Arc<dyn GraphConnection>,
) -> Field {
    let plan = Arc::new(plan_field(catalog, field, root));
    let connection = Arc::clone(connection);

    let mut output = Field::new(field.name.as_str(), type_ref(&field.ty), move |ctx| {
        let plan = Arc::clone(&plan);
        let connection = Arc::clone(&connection);
        FieldFuture::new(async move { resolve(&plan, &connection, &ctx).await })
    });
    for argument in &field.arguments {
        output = output.argument(input_value(argument));
    }
    if let Some(description) = &field.description {
        output = output.description(&**description);
    }
    output
}

fn input_value(definition: &ast::InputValueDefinition) -> InputValue {
    let mut input = InputValue::new(definition.name.as_str(), type_ref(&definition.ty));
    if let Some(default) = definition.default_value.as_deref().and_then(const_value) {
        input = input.default_value(default);
    }
    input
}

fn type_ref(ty: &ast::Type) -> TypeRef {
    match ty {
        ast::Type::Named(name) => TypeRef::named(name.as_str()),
        ast::Type::NonNullNamed(name) => TypeRef::named_nn(name.as_str()),
        ast::Type::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
        ast::Type::NonNullList(inner) => {
            TypeRef::NonNull(Box::new(TypeRef::List(Box::new(type_ref(inner)))))
        }
    }
}

/// Converts an SDL literal. Variables have no constant value.
fn const_value(value: &ast::Value) -> Option<Value> {
    Some(match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::Enum(Name::new(name.as_str())),
        ast::Value::Variable(_) => return None,
        ast::Value::String(s) => Value::String(s.to_string()),
        ast::Value::Float(f) => Value::Number(Number::from_f64(f.as_str().parse().ok()?)?),
        ast::Value::Int(i) => Value::Number(Number::from(i.as_str().parse::<i64>().ok()?)),
        ast::Value::Boolean(b) => Value::Boolean(*b),
        ast::Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| const_value(item))
                .collect::<Option<Vec<_>>>()?,
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| Some((Name::new(key.as_str()), const_value(item)?)))
                .collect::<Option<_>>()?,
        ),
    })
}

async fn resolve<'a>(
    plan: &FieldPlan,
    connection: &Arc<dyn GraphConnection>,
    ctx: &ResolverContext<'a>,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    match plan {
        FieldPlan::Null => Ok(None),
        FieldPlan::Property { name, enum_output } => {
            let node = ctx.parent_value.try_downcast_ref::<GraphNode>()?;
            Ok(node
                .property(name)
                .and_then(|value| json_field_value(value, *enum_output)))
        }
        FieldPlan::Lookup { labels, tag, list } => {
            let filter = scalar_arguments(ctx);
            let labels = labels.clone();
            let nodes = blocking(connection, move |conn| {
                let mut nodes = Vec::new();
                for label in &labels {
                    nodes.extend(conn.find_nodes(label, &filter)?);
                }
                Ok(nodes)
            })
            .await?;
            Ok(node_field_value(nodes, *tag, *list))
        }
        FieldPlan::Traverse {
            rel_type,
            direction,
            labels,
            tag,
            list,
        } => {
            let node = ctx.parent_value.try_downcast_ref::<GraphNode>()?.clone();
            let rel_type = rel_type.clone();
            let direction = *direction;
            let labels = labels.clone();
            let nodes = blocking(connection, move |conn| {
                let mut related = Vec::new();
                for label in &labels {
                    let relationship = Relationship {
                        rel_type: &rel_type,
                        direction,
                        target_label: label,
                    };
                    related.extend(conn.related_nodes(&node, &relationship)?);
                }
                Ok(related)
            })
            .await?;
            Ok(node_field_value(nodes, *tag, *list))
        }
        FieldPlan::Statement { statement, output } => {
            let mut params = statement_arguments(ctx);
            if let Some(node) = ctx.parent_value.downcast_ref::<GraphNode>() {
                params.insert("this".to_string(), node_parameter(node));
            }
            let statement = statement.clone();
            let rows = blocking(connection, move |conn| conn.run_statement(&statement, &params)).await?;

            Ok(match output {
                Output::Values { list: true, enum_output } => {
                    let items = rows
                        .iter()
                        .map(|row| json_field_value(row, *enum_output).unwrap_or(FieldValue::NULL));
                    Some(FieldValue::list(items))
                }
                Output::Values { list: false, enum_output } => rows
                    .first()
                    .and_then(|row| json_field_value(row, *enum_output)),
                Output::Nodes { label, tag, list } => {
                    let nodes = rows
                        .into_iter()
                        .filter_map(|row| node_from_row(label, row))
                        .collect();
                    node_field_value(nodes, *tag, *list)
                }
            })
        }
    }
}

/// Runs a connection call on the blocking pool.
async fn blocking<T, F>(connection: &Arc<dyn GraphConnection>, call: F) -> async_graphql::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn GraphConnection) -> Result<T, DbError> + Send + 'static,
{
    let connection = Arc::clone(connection);
    tokio::task::spawn_blocking(move || call(connection.as_ref()))
        .await
        .map_err(|e| async_graphql::Error::new(format!("Database task failed: {}", e)))?
        .map_err(|e| async_graphql::Error::new(e.to_string()))
}

/// Scalar arguments, used as property equality filters.
fn scalar_arguments(ctx: &ResolverContext<'_>) -> PropertyMap {
    ctx.args
        .iter()
        .filter_map(|(name, accessor)| match accessor.as_value() {
            Value::Null | Value::List(_) | Value::Object(_) | Value::Binary(_) => None,
            value => value
                .clone()
                .into_json()
                .ok()
                .map(|json| (name.to_string(), json)),
        })
        .collect()
}

/// Every non-null argument, passed to statements as parameters.
fn statement_arguments(ctx: &ResolverContext<'_>) -> PropertyMap {
    ctx.args
        .iter()
        .filter_map(|(name, accessor)| match accessor.as_value() {
            Value::Null => None,
            value => value
                .clone()
                .into_json()
                .ok()
                .map(|json| (name.to_string(), json)),
        })
        .collect()
}

fn node_parameter(node: &GraphNode) -> JsonValue {
    let mut properties = node.properties.clone();
    properties
        .entry("id".to_string())
        .or_insert_with(|| JsonValue::String(node.id.clone()));
    JsonValue::Object(properties)
}

fn json_field_value<'a>(value: &JsonValue, enum_output: bool) -> Option<FieldValue<'a>> {
    match value {
        JsonValue::Null => None,
        JsonValue::Array(items) => Some(FieldValue::list(
            items
                .iter()
                .map(|item| json_field_value(item, enum_output).unwrap_or(FieldValue::NULL)),
        )),
        JsonValue::String(s) if enum_output => Some(FieldValue::value(Value::Enum(Name::new(s)))),
        other => Value::from_json(other.clone()).ok().map(FieldValue::value),
    }
}

fn node_field_value<'a>(nodes: Vec<GraphNode>, tag: bool, list: bool) -> Option<FieldValue<'a>> {
    let wrap = |node: GraphNode| {
        if tag {
            let label = node.label.clone();
            FieldValue::owned_any(node).with_type(label)
        } else {
            FieldValue::owned_any(node)
        }
    };

    if list {
        Some(FieldValue::list(nodes.into_iter().map(wrap)))
    } else {
        nodes.into_iter().next().map(wrap)
    }
}

/// Accepts either the backends' node projection (`{id, label, properties}`) or
/// a bare property map.
fn node_from_row(default_label: &str, row: JsonValue) -> Option<GraphNode> {
    let JsonValue::Object(mut map) = row else {
        return None;
    };

    let id = match map.get("id") {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if let Some(JsonValue::Object(properties)) = map.remove("properties") {
        let label = match map.get("label") {
            Some(JsonValue::String(label)) => label.clone(),
            _ => default_label.to_string(),
        };
        return Some(GraphNode {
            id,
            label,
            properties,
        });
    }

    Some(GraphNode {
        id,
        label: default_label.to_string(),
        properties: map,
    })
}
