//! Mezzo - AMQP store-and-forward service bus
//!
//! # Usage
//!
//! ```bash
//! # Run the bus (default)
//! mezzo
//! mezzo serve --config config.json
//! ```

mod cmd;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Mezzo - store-and-forward ESB mediator
#[derive(Parser, Debug)]
#[command(name = "mezzo")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: std::path::PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bus
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand = serve (default behavior)
        Some(Command::Serve) | None => cmd::serve::run(&cli.config).await,
    }
}
