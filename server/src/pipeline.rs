//! Fetch and merge: everything needed to produce the canonical schema document.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::StartupError;
use crate::fetch::{RemoteSchemaLocator, SchemaSource};
use crate::schema::{CanonicalSchemaDocument, RawSchemaText, SchemaAssembler};

const SCHEMA_EXTENSIONS: [&str; 2] = ["graphql", "gql"];

pub struct SchemaPipeline {
    source: Arc<dyn SchemaSource>,
}

impl SchemaPipeline {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self { source }
    }

    /// Fetch the remote schema, add any local schema files, and merge them.
    pub async fn assemble(
        &self,
        locator: &RemoteSchemaLocator,
        local_dir: Option<&Path>,
    ) -> Result<CanonicalSchemaDocument, StartupError> {
        let mut sources = vec![self.fetch_remote(locator).await?];
        if let Some(dir) = local_dir {
            sources.extend(load_local_schemas(dir)?);
        }

        let document = SchemaAssembler::merge(&sources)?;
        tracing::info!(
            sources = sources.len(),
            types = document.type_names().len(),
            "schema assembled"
        );
        Ok(document)
    }

    /// Fetch the remote schema, turning an absent artifact into an error.
    pub async fn fetch_remote(&self, locator: &RemoteSchemaLocator) -> Result<RawSchemaText, StartupError> {
        match self.source.fetch(locator).await {
            Ok(Some(text)) => Ok(text),
            Ok(None) => Err(StartupError::RemoteArtifactMissing {
                owner: locator.owner.clone(),
                repo: locator.repo.clone(),
                path: locator.path.clone(),
            }),
            Err(source) => Err(StartupError::RemoteFetchFailed {
                owner: locator.owner.clone(),
                repo: locator.repo.clone(),
                path: locator.path.clone(),
                source,
            }),
        }
    }
}

/// Read every `*.graphql` / `*.gql` file directly under `dir`, sorted by file name.
pub fn load_local_schemas(dir: &Path) -> Result<Vec<RawSchemaText>, StartupError> {
    let local_error = |path: &Path, e: std::io::Error| StartupError::LocalSchemaFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| local_error(dir, e))? {
        let path = entry.map_err(|e| local_error(dir, e))?.path();
        let is_schema = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCHEMA_EXTENSIONS.contains(&ext));
        if is_schema && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path).map_err(|e| local_error(&path, e))?;
            tracing::debug!(path = %path.display(), "loaded local schema");
            Ok(RawSchemaText::new(path.display().to_string(), text))
        })
        .collect()
}
