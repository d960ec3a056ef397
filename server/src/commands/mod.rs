//! Command definitions and implementations.
//!
//! Each command is defined in its own module with:
//! - The command struct with clap attributes for CLI parsing
//! - An `Execute` implementation producing an `Outputable` result

mod print_schema;
mod serve;

pub use print_schema::PrintSchemaCmd;
pub use serve::ServeCmd;

use clap::Subcommand;
use std::error::Error;

use crate::config::Configuration;
use crate::output::{OutputFormat, Outputable};

/// Trait for executing commands with command-specific result types.
#[allow(async_fn_in_trait)]
pub trait Execute {
    type Output: Outputable;

    async fn execute(self, config: Configuration) -> Result<Self::Output, Box<dyn Error>>;
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the schema, connect to the database and serve GraphQL until signalled
    Serve(ServeCmd),

    /// Fetch and merge the schema, then print the canonical SDL
    PrintSchema(PrintSchemaCmd),
}

impl Command {
    /// Execute the command and return formatted output
    pub async fn run(self, config: Configuration) -> Result<String, Box<dyn Error>> {
        match self {
            Command::Serve(cmd) => {
                let result = cmd.execute(config).await?;
                Ok(result.format(OutputFormat::Text))
            }
            Command::PrintSchema(cmd) => {
                let format = cmd.format;
                let result = cmd.execute(config).await?;
                Ok(result.format(format))
            }
        }
    }
}
