//! graph_gateway library - GraphQL server over a graph database
//!
//! Fetches its schema from a GitHub repository, merges it with any local
//! schema files, compiles it against a graph database connection, and serves
//! it over HTTP until signalled to drain.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod output;
pub mod pipeline;
pub mod schema;


#[cfg(test)]
#[macro_use]
mod test_macros;

#[cfg(test)]
mod test_utils;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,graph_gateway=debug";

/// Install the global `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
