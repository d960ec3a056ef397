mod execute;
mod output;

use clap::Args;

use crate::output::OutputFormat;

/// Fetch and merge the schema, then print the canonical SDL
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  graph_gateway print-schema              # Canonical SDL on stdout
  graph_gateway print-schema -o json      # SDL plus type names as JSON")]
pub struct PrintSchemaCmd {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
