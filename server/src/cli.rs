//! CLI argument definitions.
//!
//! This module contains the top-level CLI structure.
//! Individual command definitions are in the `commands` module.

use clap::Parser;
use std::path::PathBuf;

use crate::commands::{Command, ServeCmd};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Dotenv file to load before reading the environment (default: ./.env if present)
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// The chosen subcommand, `serve` when none was given.
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Serve(ServeCmd::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_no_subcommand_defaults_to_serve() {
        let args = Args::try_parse_from(["graph_gateway"]).unwrap();
        assert!(matches!(args.command(), Command::Serve(ServeCmd { port: None })));
    }

    #[rstest]
    fn test_env_file_is_global() {
        let args = Args::try_parse_from(["graph_gateway", "print-schema", "--env-file", "prod.env"]).unwrap();
        assert_eq!(args.env_file, Some(PathBuf::from("prod.env")));
    }

    #[rstest]
    fn test_unknown_subcommand_rejected() {
        assert!(Args::try_parse_from(["graph_gateway", "migrate"]).is_err());
    }
}
