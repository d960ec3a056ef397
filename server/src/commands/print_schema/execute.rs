use std::error::Error;
use std::sync::Arc;

use serde::Serialize;

use super::PrintSchemaCmd;
use crate::commands::Execute;
use crate::config::{Configuration, PRINT_SCHEMA_REQUIRED_KEYS};
use crate::error::StartupError;
use crate::fetch::{GitHubSchemaSource, SchemaSource};
use crate::pipeline::SchemaPipeline;

/// The merged schema as it would be compiled by `serve`.
#[derive(Debug, Serialize)]
pub struct PrintSchemaResult {
    pub origin: String,
    pub types: Vec<String>,
    pub sdl: String,
}

impl PrintSchemaCmd {
    /// Run against an explicit schema source.
    pub async fn execute_with(
        self,
        config: &Configuration,
        source: Arc<dyn SchemaSource>,
    ) -> Result<PrintSchemaResult, StartupError> {
        config.validate(PRINT_SCHEMA_REQUIRED_KEYS)?;
        let locator = config.locator()?;
        let local_dir = config.local_schema_dir();

        let document = SchemaPipeline::new(source)
            .assemble(&locator, local_dir.as_deref())
            .await?;

        Ok(PrintSchemaResult {
            origin: locator.to_string(),
            types: document.type_names().into_iter().map(str::to_string).collect(),
            sdl: document.sdl().to_string(),
        })
    }
}

impl Execute for PrintSchemaCmd {
    type Output = PrintSchemaResult;

    async fn execute(self, config: Configuration) -> Result<Self::Output, Box<dyn Error>> {
        let source = Arc::new(GitHubSchemaSource::new()?);
        Ok(self.execute_with(&config, source).await?)
    }
}
