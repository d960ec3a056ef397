//! Merging SDL sources into one canonical schema document.
//!
//! Same-named definitions are combined by kind, extensions fold into their
//! base definition, and the result is rendered in a fixed order:
//!
//! 1. the schema definition (if any source declares one)
//! 2. directive definitions, by name
//! 3. type definitions, by name
//!
//! Fields, enum values, union members and implemented interfaces are sorted by
//! name inside each definition, so the output does not depend on input order.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use apollo_compiler::Node;
use apollo_compiler::ast::{self, Definition, DirectiveList, Document, OperationType};
use apollo_compiler::Name;
use thiserror::Error;

use super::RawSchemaText;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("No schema sources to merge")]
    Empty,

    #[error("Failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Conflicting definitions of '{name}': {reason}")]
    Conflict { name: String, reason: String },
}

/// A merged, normalized schema document.
///
/// Two documents are equal when their rendered SDL is equal.
#[derive(Debug, Clone)]
pub struct CanonicalSchemaDocument {
    document: Document,
    sdl: String,
}

impl CanonicalSchemaDocument {
    pub fn sdl(&self) -> &str {
        &self.sdl
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Names of every type definition, in canonical order.
    pub fn type_names(&self) -> Vec<&str> {
        self.document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::ScalarTypeDefinition(def) => Some(def.name.as_str()),
                Definition::ObjectTypeDefinition(def) => Some(def.name.as_str()),
                Definition::InterfaceTypeDefinition(def) => Some(def.name.as_str()),
                Definition::UnionTypeDefinition(def) => Some(def.name.as_str()),
                Definition::EnumTypeDefinition(def) => Some(def.name.as_str()),
                Definition::InputObjectTypeDefinition(def) => Some(def.name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl PartialEq for CanonicalSchemaDocument {
    fn eq(&self, other: &Self) -> bool {
        self.sdl == other.sdl
    }
}

impl Eq for CanonicalSchemaDocument {}

impl fmt::Display for CanonicalSchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sdl)
    }
}

/// Combines raw SDL texts into a [`CanonicalSchemaDocument`].
pub struct SchemaAssembler;

impl SchemaAssembler {
    /// Merge every source into one document.
    ///
    /// Fails on the first source that does not parse, on executable
    /// definitions, and on same-named definitions that cannot be combined.
    pub fn merge<I>(sources: I) -> Result<CanonicalSchemaDocument, MergeError>
    where
        I: IntoIterator,
        I::Item: Borrow<RawSchemaText>,
    {
        let mut merger = Merger::default();
        let mut count = 0usize;

        for source in sources {
            let source = source.borrow();
            count += 1;
            let document = Document::parse(source.as_str(), source.origin()).map_err(|e| {
                MergeError::Parse {
                    origin: source.origin().to_string(),
                    message: e.errors.to_string(),
                }
            })?;
            for definition in &document.definitions {
                merger.absorb(source.origin(), definition)?;
            }
        }

        if count == 0 {
            return Err(MergeError::Empty);
        }

        Ok(merger.finish())
    }

    /// Normalize a single source. Same as merging a one-element list.
    pub fn canonicalize(source: &RawSchemaText) -> Result<CanonicalSchemaDocument, MergeError> {
        Self::merge([source])
    }
}

#[derive(Default)]
struct Merger {
    schema: Option<SchemaParts>,
    directives: BTreeMap<String, ast::DirectiveDefinition>,
    types: BTreeMap<String, TypeDef>,
}

struct SchemaParts {
    description: Option<Node<str>>,
    directives: DirectiveList,
    root_operations: BTreeMap<u8, (OperationType, Name)>,
}

enum TypeDef {
    Scalar(ast::ScalarTypeDefinition),
    Object(ast::ObjectTypeDefinition),
    Interface(ast::InterfaceTypeDefinition),
    Union(ast::UnionTypeDefinition),
    Enum(ast::EnumTypeDefinition),
    InputObject(ast::InputObjectTypeDefinition),
}

impl Merger {
    fn absorb(&mut self, origin: &str, definition: &Definition) -> Result<(), MergeError> {
        match definition {
            Definition::OperationDefinition(op) => {
                let name = op.name.as_ref().map_or("<anonymous>", |n| n.as_str());
                Err(executable_definition(origin, "operation", name))
            }
            Definition::FragmentDefinition(fragment) => Err(executable_definition(
                origin,
                "fragment",
                fragment.name.as_str(),
            )),
            Definition::SchemaDefinition(def) => self.absorb_schema(
                def.description.clone(),
                &def.directives,
                &def.root_operations,
            ),
            Definition::SchemaExtension(ext) => {
                self.absorb_schema(None, &ext.directives, &ext.root_operations)
            }
            Definition::DirectiveDefinition(def) => self.absorb_directive(def),
            Definition::ScalarTypeDefinition(def) => self.absorb_type(TypeDef::Scalar((**def).clone())),
            Definition::ObjectTypeDefinition(def) => self.absorb_type(TypeDef::Object((**def).clone())),
            Definition::InterfaceTypeDefinition(def) => {
                self.absorb_type(TypeDef::Interface((**def).clone()))
            }
            Definition::UnionTypeDefinition(def) => self.absorb_type(TypeDef::Union((**def).clone())),
            Definition::EnumTypeDefinition(def) => self.absorb_type(TypeDef::Enum((**def).clone())),
            Definition::InputObjectTypeDefinition(def) => {
                self.absorb_type(TypeDef::InputObject((**def).clone()))
            }
            Definition::ScalarTypeExtension(ext) => {
                self.absorb_type(TypeDef::Scalar(ast::ScalarTypeDefinition {
                    description: None,
                    name: ext.name.clone(),
                    directives: ext.directives.clone(),
                }))
            }
            Definition::ObjectTypeExtension(ext) => {
                self.absorb_type(TypeDef::Object(ast::ObjectTypeDefinition {
                    description: None,
                    name: ext.name.clone(),
                    implements_interfaces: ext.implements_interfaces.clone(),
                    directives: ext.directives.clone(),
                    fields: ext.fields.clone(),
                }))
            }
            Definition::InterfaceTypeExtension(ext) => {
                self.absorb_type(TypeDef::Interface(ast::InterfaceTypeDefinition {
                    description: None,
                    name: ext.name.clone(),
                    implements_interfaces: ext.implements_interfaces.clone(),
                    directives: ext.directives.clone(),
                    fields: ext.fields.clone(),
                }))
            }
            Definition::UnionTypeExtension(ext) => {
                self.absorb_type(TypeDef::Union(ast::UnionTypeDefinition {
                    description: None,
                    name: ext.name.clone(),
                    directives: ext.directives.clone(),
                    members: ext.members.clone(),
                }))
            }
            Definition::EnumTypeExtension(ext) => {
                self.absorb_type(TypeDef::Enum(ast::EnumTypeDefinition {
                    description: None,
                    name: ext.name.clone(),
                    directives: ext.directives.clone(),
                    values: ext.values.clone(),
                }))
            }
            Definition::InputObjectTypeExtension(ext) => {
                self.absorb_type(TypeDef::InputObject(ast::InputObjectTypeDefinition {
                    description: None,
                    name: ext.name.clone(),
                    directives: ext.directives.clone(),
                    fields: ext.fields.clone(),
                }))
            }
        }
    }

    fn absorb_schema(
        &mut self,
        description: Option<Node<str>>,
        directives: &DirectiveList,
        root_operations: &[Node<(OperationType, Name)>],
    ) -> Result<(), MergeError> {
        let parts = self.schema.get_or_insert_with(|| SchemaParts {
            description: None,
            directives: DirectiveList(Vec::new()),
            root_operations: BTreeMap::new(),
        });

        parts.description = pick_description(parts.description.take(), description);
        let current = std::mem::replace(&mut parts.directives, DirectiveList(Vec::new()));
        parts.directives = union_directives(current, directives.clone());

        for root in root_operations {
            let (operation, named_type) = &**root;
            let rank = operation_rank(*operation);
            match parts.root_operations.get(&rank) {
                Some((_, existing)) if existing != named_type => {
                    let mut bound = [existing.as_str(), named_type.as_str()];
                    bound.sort_unstable();
                    return Err(MergeError::Conflict {
                        name: "schema".to_string(),
                        reason: format!(
                            "{} root operation bound to both '{}' and '{}'",
                            operation_keyword(*operation),
                            bound[0],
                            bound[1]
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    parts
                        .root_operations
                        .insert(rank, (*operation, named_type.clone()));
                }
            }
        }
        Ok(())
    }

    fn absorb_directive(&mut self, incoming: &ast::DirectiveDefinition) -> Result<(), MergeError> {
        let name = incoming.name.as_str().to_string();
        let mut incoming = incoming.clone();
        incoming.arguments = sorted_by_name(incoming.arguments, |arg| arg.name.as_str());

        match self.directives.remove(&name) {
            None => {
                self.directives.insert(name, incoming);
            }
            Some(mut existing) => {
                let same = existing.repeatable == incoming.repeatable
                    && same_locations(&existing.locations, &incoming.locations)
                    && same_input_values(&existing.arguments, &incoming.arguments);
                if !same {
                    return Err(MergeError::Conflict {
                        name: format!("@{name}"),
                        reason: "directive definitions differ".to_string(),
                    });
                }
                existing.description =
                    pick_description(existing.description.take(), incoming.description);
                self.directives.insert(name, existing);
            }
        }
        Ok(())
    }

    fn absorb_type(&mut self, incoming: TypeDef) -> Result<(), MergeError> {
        let name = incoming.name().to_string();
        let base = match self.types.remove(&name) {
            Some(existing) => existing,
            None => incoming.empty_like(),
        };
        let merged = merge_types(&name, base, incoming)?;
        self.types.insert(name, merged);
        Ok(())
    }

    fn finish(self) -> CanonicalSchemaDocument {
        let mut document = Document::new();

        if let Some(parts) = self.schema {
            document
                .definitions
                .push(Definition::SchemaDefinition(Node::new(ast::SchemaDefinition {
                    description: parts.description,
                    directives: parts.directives,
                    root_operations: parts
                        .root_operations
                        .into_values()
                        .map(Node::new)
                        .collect(),
                })));
        }

        for definition in self.directives.into_values() {
            document
                .definitions
                .push(Definition::DirectiveDefinition(Node::new(definition)));
        }

        for definition in self.types.into_values() {
            document.definitions.push(definition.into_definition());
        }

        let sdl = document.to_string();
        CanonicalSchemaDocument { document, sdl }
    }
}

impl TypeDef {
    fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => def.name.as_str(),
            Self::Object(def) => def.name.as_str(),
            Self::Interface(def) => def.name.as_str(),
            Self::Union(def) => def.name.as_str(),
            Self::Enum(def) => def.name.as_str(),
            Self::InputObject(def) => def.name.as_str(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "object type",
            Self::Interface(_) => "interface",
            Self::Union(_) => "union",
            Self::Enum(_) => "enum",
            Self::InputObject(_) => "input object",
        }
    }

    /// A definition of the same kind and name with no members.
    fn empty_like(&self) -> Self {
        match self {
            Self::Scalar(def) => Self::Scalar(ast::ScalarTypeDefinition {
                description: None,
                name: def.name.clone(),
                directives: DirectiveList(Vec::new()),
            }),
            Self::Object(def) => Self::Object(ast::ObjectTypeDefinition {
                description: None,
                name: def.name.clone(),
                implements_interfaces: Vec::new(),
                directives: DirectiveList(Vec::new()),
                fields: Vec::new(),
            }),
            Self::Interface(def) => Self::Interface(ast::InterfaceTypeDefinition {
                description: None,
                name: def.name.clone(),
                implements_interfaces: Vec::new(),
                directives: DirectiveList(Vec::new()),
                fields: Vec::new(),
            }),
            Self::Union(def) => Self::Union(ast::UnionTypeDefinition {
                description: None,
                name: def.name.clone(),
                directives: DirectiveList(Vec::new()),
                members: Vec::new(),
            }),
            Self::Enum(def) => Self::Enum(ast::EnumTypeDefinition {
                description: None,
                name: def.name.clone(),
                directives: DirectiveList(Vec::new()),
                values: Vec::new(),
            }),
            Self::InputObject(def) => Self::InputObject(ast::InputObjectTypeDefinition {
                description: None,
                name: def.name.clone(),
                directives: DirectiveList(Vec::new()),
                fields: Vec::new(),
            }),
        }
    }

    fn into_definition(self) -> Definition {
        match self {
            Self::Scalar(def) => Definition::ScalarTypeDefinition(Node::new(def)),
            Self::Object(def) => Definition::ObjectTypeDefinition(Node::new(def)),
            Self::Interface(def) => Definition::InterfaceTypeDefinition(Node::new(def)),
            Self::Union(def) => Definition::UnionTypeDefinition(Node::new(def)),
            Self::Enum(def) => Definition::EnumTypeDefinition(Node::new(def)),
            Self::InputObject(def) => Definition::InputObjectTypeDefinition(Node::new(def)),
        }
    }
}

fn merge_types(name: &str, existing: TypeDef, incoming: TypeDef) -> Result<TypeDef, MergeError> {
    match (existing, incoming) {
        (TypeDef::Scalar(mut a), TypeDef::Scalar(b)) => {
            a.description = pick_description(a.description, b.description);
            a.directives = union_directives(a.directives, b.directives);
            Ok(TypeDef::Scalar(a))
        }
        (TypeDef::Object(mut a), TypeDef::Object(b)) => {
            a.description = pick_description(a.description, b.description);
            a.implements_interfaces = union_names(a.implements_interfaces, b.implements_interfaces);
            a.directives = union_directives(a.directives, b.directives);
            a.fields = union_fields(name, a.fields, b.fields)?;
            Ok(TypeDef::Object(a))
        }
        (TypeDef::Interface(mut a), TypeDef::Interface(b)) => {
            a.description = pick_description(a.description, b.description);
            a.implements_interfaces = union_names(a.implements_interfaces, b.implements_interfaces);
            a.directives = union_directives(a.directives, b.directives);
            a.fields = union_fields(name, a.fields, b.fields)?;
            Ok(TypeDef::Interface(a))
        }
        (TypeDef::Union(mut a), TypeDef::Union(b)) => {
            a.description = pick_description(a.description, b.description);
            a.directives = union_directives(a.directives, b.directives);
            a.members = union_names(a.members, b.members);
            Ok(TypeDef::Union(a))
        }
        (TypeDef::Enum(mut a), TypeDef::Enum(b)) => {
            a.description = pick_description(a.description, b.description);
            a.directives = union_directives(a.directives, b.directives);
            a.values = union_enum_values(name, a.values, b.values)?;
            Ok(TypeDef::Enum(a))
        }
        (TypeDef::InputObject(mut a), TypeDef::InputObject(b)) => {
            a.description = pick_description(a.description, b.description);
            a.directives = union_directives(a.directives, b.directives);
            a.fields = union_input_fields(name, a.fields, b.fields)?;
            Ok(TypeDef::InputObject(a))
        }
        (a, b) => {
            let mut kinds = [a.kind(), b.kind()];
            kinds.sort_unstable();
            Err(MergeError::Conflict {
                name: name.to_string(),
                reason: format!("defined both as {} and as {}", kinds[0], kinds[1]),
            })
        }
    }
}

fn union_fields(
    type_name: &str,
    left: Vec<Node<ast::FieldDefinition>>,
    right: Vec<Node<ast::FieldDefinition>>,
) -> Result<Vec<Node<ast::FieldDefinition>>, MergeError> {
    let mut merged: BTreeMap<String, ast::FieldDefinition> = BTreeMap::new();

    for field in left.into_iter().chain(right) {
        let mut field = (*field).clone();
        field.arguments = sorted_by_name(field.arguments, |arg| arg.name.as_str());
        let key = field.name.as_str().to_string();

        match merged.remove(&key) {
            None => {
                merged.insert(key, field);
            }
            Some(mut existing) => {
                let same = existing.ty == field.ty
                    && existing.directives == field.directives
                    && same_input_values(&existing.arguments, &field.arguments);
                if !same {
                    return Err(MergeError::Conflict {
                        name: format!("{type_name}.{key}"),
                        reason: "field definitions differ".to_string(),
                    });
                }
                existing.description = pick_description(existing.description.take(), field.description);
                merged.insert(key, existing);
            }
        }
    }

    Ok(merged.into_values().map(Node::new).collect())
}

fn union_input_fields(
    type_name: &str,
    left: Vec<Node<ast::InputValueDefinition>>,
    right: Vec<Node<ast::InputValueDefinition>>,
) -> Result<Vec<Node<ast::InputValueDefinition>>, MergeError> {
    let mut merged: BTreeMap<String, Node<ast::InputValueDefinition>> = BTreeMap::new();

    for field in left.into_iter().chain(right) {
        let key = field.name.as_str().to_string();
        match merged.remove(&key) {
            None => {
                merged.insert(key, field);
            }
            Some(existing) => {
                if !same_input_value(&existing, &field) {
                    return Err(MergeError::Conflict {
                        name: format!("{type_name}.{key}"),
                        reason: "input field definitions differ".to_string(),
                    });
                }
                let mut combined = (*existing).clone();
                combined.description =
                    pick_description(combined.description.take(), field.description.clone());
                merged.insert(key, Node::new(combined));
            }
        }
    }

    Ok(merged.into_values().collect())
}

fn union_enum_values(
    type_name: &str,
    left: Vec<Node<ast::EnumValueDefinition>>,
    right: Vec<Node<ast::EnumValueDefinition>>,
) -> Result<Vec<Node<ast::EnumValueDefinition>>, MergeError> {
    let mut merged: BTreeMap<String, Node<ast::EnumValueDefinition>> = BTreeMap::new();

    for value in left.into_iter().chain(right) {
        let key = value.value.as_str().to_string();
        match merged.remove(&key) {
            None => {
                merged.insert(key, value);
            }
            Some(existing) => {
                if existing.directives != value.directives {
                    return Err(MergeError::Conflict {
                        name: format!("{type_name}.{key}"),
                        reason: "enum value directives differ".to_string(),
                    });
                }
                let mut combined = (*existing).clone();
                combined.description =
                    pick_description(combined.description.take(), value.description.clone());
                merged.insert(key, Node::new(combined));
            }
        }
    }

    Ok(merged.into_values().collect())
}

fn union_names(left: Vec<Name>, right: Vec<Name>) -> Vec<Name> {
    let merged: BTreeMap<String, Name> = left
        .into_iter()
        .chain(right)
        .map(|name| (name.as_str().to_string(), name))
        .collect();
    merged.into_values().collect()
}

fn union_directives(left: DirectiveList, right: DirectiveList) -> DirectiveList {
    let mut merged: Vec<Node<ast::Directive>> = Vec::new();
    for directive in left.0.into_iter().chain(right.0) {
        if !merged.contains(&directive) {
            merged.push(directive);
        }
    }
    // Repeatable directives share a name; their rendering breaks the tie.
    merged.sort_by_cached_key(|directive| (directive.name.to_string(), directive.to_string()));
    DirectiveList(merged)
}

/// The present description wins; of two, the lexicographically smaller one.
fn pick_description(a: Option<Node<str>>, b: Option<Node<str>>) -> Option<Node<str>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if *b < *a {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, None) => a,
        (None, b) => b,
    }
}

fn same_input_value(a: &ast::InputValueDefinition, b: &ast::InputValueDefinition) -> bool {
    a.name == b.name
        && a.ty == b.ty
        && a.default_value == b.default_value
        && a.directives == b.directives
}

/// Compares argument lists that are already sorted by name. Descriptions are ignored.
fn same_input_values(
    a: &[Node<ast::InputValueDefinition>],
    b: &[Node<ast::InputValueDefinition>],
) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_input_value(x, y))
}

fn same_locations(a: &[ast::DirectiveLocation], b: &[ast::DirectiveLocation]) -> bool {
    a.iter().all(|loc| b.contains(loc)) && b.iter().all(|loc| a.contains(loc))
}

fn sorted_by_name<T>(mut items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    items.sort_by(|a, b| key(a).cmp(key(b)));
    items
}

fn operation_rank(operation: OperationType) -> u8 {
    match operation {
        OperationType::Query => 0,
        OperationType::Mutation => 1,
        OperationType::Subscription => 2,
    }
}

fn operation_keyword(operation: OperationType) -> &'static str {
    match operation {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    }
}

fn executable_definition(origin: &str, kind: &str, name: &str) -> MergeError {
    MergeError::Parse {
        origin: origin.to_string(),
        message: format!("{kind} '{name}' is not allowed in a schema source"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw(origin: &str, text: &str) -> RawSchemaText {
        RawSchemaText::new(origin, text)
    }

    fn merge(texts: &[&str]) -> Result<CanonicalSchemaDocument, MergeError> {
        let sources: Vec<RawSchemaText> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| raw(&format!("source{i}.graphql"), text))
            .collect();
        SchemaAssembler::merge(&sources)
    }

    fn position(sdl: &str, needle: &str) -> usize {
        sdl.find(needle)
            .unwrap_or_else(|| panic!("'{needle}' not found in:\n{sdl}"))
    }

    const MOVIES: &str = r#"
        type Movie {
          title: String
          released: Int
        }

        type Query {
          movies: [Movie]
        }
    "#;

    const PEOPLE: &str = r#"
        type Person {
          name: String
        }

        extend type Query {
          people: [Person]
        }
    "#;

    #[test]
    fn test_canonicalize_equals_single_merge() {
        let source = raw("movies.graphql", MOVIES);
        let canonical = SchemaAssembler::canonicalize(&source).unwrap();
        let merged = SchemaAssembler::merge([source]).unwrap();
        assert_eq!(canonical, merged);
        assert_eq!(canonical.sdl(), merged.sdl());
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let once = SchemaAssembler::canonicalize(&raw("a", MOVIES)).unwrap();
        let twice = SchemaAssembler::canonicalize(&raw("b", once.sdl())).unwrap();
        assert_eq!(once, twice);
    }

    #[rstest]
    #[case(MOVIES, PEOPLE)]
    #[case("type Query { a: Int }", "type Other { b: String }")]
    #[case("enum Genre { DRAMA }", "scalar DateTime")]
    fn test_merge_is_order_independent(#[case] a: &str, #[case] b: &str) {
        assert_eq!(merge(&[a, b]).unwrap(), merge(&[b, a]).unwrap());
    }

    #[test]
    fn test_repeatable_directives_merge_in_either_order() {
        let directive = "directive @tag(name: String!) repeatable on OBJECT";
        let a = format!(r#"{directive} type T @tag(name: "a") {{ id: ID }}"#);
        let b = format!(r#"{directive} type T @tag(name: "b") {{ id: ID }}"#);

        let ab = merge(&[a.as_str(), b.as_str()]).unwrap();
        let ba = merge(&[b.as_str(), a.as_str()]).unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab.sdl(), ba.sdl());
        assert!(position(ab.sdl(), r#"@tag(name: "a")"#) < position(ab.sdl(), r#"@tag(name: "b")"#));
    }

    #[test]
    fn test_merge_is_associative() {
        let c = "type Studio { name: String }";
        let ab = merge(&[MOVIES, PEOPLE]).unwrap();
        let left = merge(&[ab.sdl(), c]).unwrap();

        let bc = merge(&[PEOPLE, c]).unwrap();
        let right = merge(&[MOVIES, bc.sdl()]).unwrap();

        assert_eq!(left, right);
        assert_eq!(left, merge(&[MOVIES, PEOPLE, c]).unwrap());
    }

    #[test]
    fn test_merge_unions_object_fields() {
        let doc = merge(&["type Query { b: Int }", "type Query { a: String b: Int }"]).unwrap();
        let sdl = doc.sdl();
        assert!(position(sdl, "a: String") < position(sdl, "b: Int"));
        assert_eq!(sdl.matches("b: Int").count(), 1);
        assert_eq!(doc.type_names(), vec!["Query"]);
    }

    #[test]
    fn test_extension_folds_into_base() {
        let doc = merge(&[MOVIES, PEOPLE]).unwrap();
        let sdl = doc.sdl();
        assert!(!sdl.contains("extend"));
        assert!(sdl.contains("movies: [Movie]"));
        assert!(sdl.contains("people: [Person]"));
    }

    #[test]
    fn test_extension_without_base_becomes_base() {
        let doc = merge(&["extend type Query { ping: String }"]).unwrap();
        assert!(doc.sdl().contains("type Query"));
        assert!(!doc.sdl().contains("extend"));
    }

    #[rstest]
    #[case("type Query { a: Int }", "type Query { a: String }")]
    #[case("type Query { a: Int }", "enum Query { A }")]
    #[case("input Filter { id: ID }", "input Filter { id: ID! }")]
    #[case("type Query { a(x: Int): Int }", "type Query { a(x: String): Int }")]
    #[case("directive @auth on FIELD_DEFINITION", "directive @auth on OBJECT")]
    #[case(
        "schema { query: Query } type Query { a: Int } type Root { a: Int }",
        "schema { query: Root }"
    )]
    fn test_incompatible_definitions_conflict_in_both_orders(#[case] a: &str, #[case] b: &str) {
        assert!(matches!(merge(&[a, b]), Err(MergeError::Conflict { .. })));
        assert!(matches!(merge(&[b, a]), Err(MergeError::Conflict { .. })));
    }

    #[test]
    fn test_conflict_names_the_field() {
        let err = merge(&["type Query { a: Int }", "type Query { a: String }"]).unwrap_err();
        match err {
            MergeError::Conflict { name, .. } => assert_eq!(name, "Query.a"),
            other => panic!("Expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_conflict_reason_is_order_independent() {
        let a = merge(&["type T { a: Int }", "scalar T"]).unwrap_err();
        let b = merge(&["scalar T", "type T { a: Int }"]).unwrap_err();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_order() {
        let doc = merge(&[
            "type Zebra { a: Int } directive @beta on FIELD_DEFINITION",
            "type Query { z: Zebra } directive @alpha on OBJECT schema { query: Query }",
            "enum Kind { B A }",
        ])
        .unwrap();
        let sdl = doc.sdl();

        assert!(position(sdl, "schema") < position(sdl, "directive @alpha"));
        assert!(position(sdl, "directive @alpha") < position(sdl, "directive @beta"));
        assert!(position(sdl, "directive @beta") < position(sdl, "enum Kind"));
        assert!(position(sdl, "enum Kind") < position(sdl, "type Query"));
        assert!(position(sdl, "type Query") < position(sdl, "type Zebra"));
        assert_eq!(doc.type_names(), vec!["Kind", "Query", "Zebra"]);
    }

    #[test]
    fn test_enum_and_union_members_are_merged_and_sorted() {
        let doc = merge(&[
            "enum Genre { DRAMA } union Credit = Person",
            "enum Genre { ACTION DRAMA } union Credit = Company",
            "type Person { name: String } type Company { name: String }",
        ])
        .unwrap();
        let sdl = doc.sdl();
        assert!(position(sdl, "ACTION") < position(sdl, "DRAMA"));
        assert_eq!(sdl.matches("DRAMA").count(), 1);
        assert!(position(sdl, "Company |") < position(sdl, "| Person"));
    }

    #[test]
    fn test_descriptions_present_one_wins() {
        let doc = merge(&["\"Films\" type Movie { a: Int }", "type Movie { b: Int }"]).unwrap();
        assert!(doc.sdl().contains("Films"));
    }

    #[test]
    fn test_differing_descriptions_are_deterministic() {
        let a = "\"Beta\" type Movie { a: Int }";
        let b = "\"Alpha\" type Movie { a: Int }";
        let doc = merge(&[a, b]).unwrap();
        assert_eq!(doc, merge(&[b, a]).unwrap());
        assert!(doc.sdl().contains("Alpha"));
        assert!(!doc.sdl().contains("Beta"));
    }

    #[test]
    fn test_parse_error_names_origin() {
        let err = SchemaAssembler::merge([raw("remote:acme/schemas/bad.graphql", "type {")]).unwrap_err();
        match err {
            MergeError::Parse { origin, .. } => assert_eq!(origin, "remote:acme/schemas/bad.graphql"),
            other => panic!("Expected Parse, got {other:?}"),
        }
    }

    #[rstest]
    #[case("query Movies { movies { title } }")]
    #[case("{ movies { title } }")]
    #[case("fragment F on Movie { title }")]
    fn test_executable_definitions_are_rejected(#[case] text: &str) {
        let err = merge(&["type Query { a: Int }", text]).unwrap_err();
        assert!(matches!(err, MergeError::Parse { .. }));
        assert!(err.to_string().contains("not allowed in a schema source"));
    }

    #[test]
    fn test_empty_input() {
        let sources: Vec<RawSchemaText> = Vec::new();
        assert_eq!(SchemaAssembler::merge(&sources).unwrap_err(), MergeError::Empty);
    }

    #[test]
    fn test_identical_duplicates_merge_cleanly() {
        let doc = merge(&[MOVIES, MOVIES]).unwrap();
        assert_eq!(doc, merge(&[MOVIES]).unwrap());
    }

    #[test]
    fn test_schema_definition_root_operations_union() {
        let doc = merge(&[
            "schema { query: Query } type Query { a: Int }",
            "extend schema { mutation: Mutation } type Mutation { b: Int }",
        ])
        .unwrap();
        let sdl = doc.sdl();
        assert!(sdl.contains("query: Query"));
        assert!(sdl.contains("mutation: Mutation"));
        assert!(position(sdl, "schema") < position(sdl, "type Mutation"));
    }
}
