use clap::Parser;

use graph_gateway::cli::Args;
use graph_gateway::config::Configuration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    graph_gateway::init_tracing();

    let config = Configuration::load(args.env_file.as_deref())?;
    let output = args.command().run(config).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
