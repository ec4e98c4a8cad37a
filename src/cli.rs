use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "deploybot")]
#[command(about = "DeployBot deployment orchestration controller", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the DeployBot controller service
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (overrides config)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Path to the TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the Store's on-disk keyspace (overrides config)
    #[arg(long)]
    pub store_path: Option<PathBuf>,
}
