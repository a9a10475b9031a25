//! sitepush CLI - Deploy static websites to object storage buckets.
//!
//! Provides commands for:
//! - `deploy`: Publish every site under the sites directory
//! - `plan`: Show asset names and entry documents without uploading

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{DeployArgs, PlanArgs};
use output::Output;

/// sitepush - Deploy static websites to object storage buckets.
#[derive(Parser)]
#[command(name = "sitepush", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every site to its own bucket.
    Deploy(DeployArgs),
    /// Show what a deployment would upload, without touching storage.
    Plan(PlanArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Deploy(args) => args.verbose,
        Commands::Plan(args) => args.verbose,
    };

    // Initialize tracing with appropriate log level
    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Deploy(args) => args.execute(),
        Commands::Plan(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
