//! Schema handling: raw SDL sources, merging into a canonical document and
//! compiling that document into an executable schema.

pub mod compile;
pub mod merge;
pub(crate) mod resolve;

use std::fmt;

pub use compile::{CompileError, CompileOptions, ExecutableSchema, GraphSchemaCompiler, SchemaCompiler};
pub use merge::{CanonicalSchemaDocument, MergeError, SchemaAssembler};

/// SDL text read from exactly one source.
///
/// `origin` names the source (a remote locator or a local file) and appears
/// in parse diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSchemaText {
    origin: String,
    text: String,
}

impl RawSchemaText {
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for RawSchemaText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.origin, self.text.len())
    }
}
