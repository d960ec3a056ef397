mod execute;

use clap::Args;

/// Serve the remote schema over HTTP until SIGINT or SIGTERM
#[derive(Args, Debug, Default)]
#[command(after_help = "\
Examples:
  graph_gateway serve                    # Listen on $PORT
  graph_gateway serve --port 8080        # Override $PORT
  graph_gateway --env-file prod.env      # serve is the default command")]
pub struct ServeCmd {
    /// Listening port, overriding PORT from the environment
    #[arg(short, long)]
    pub port: Option<u16>,
}
