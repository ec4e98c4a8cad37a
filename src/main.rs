mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use deploybot::api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => api::run(args.address, args.config, args.store_path).await?,
    }

    Ok(())
}
