//! tunectl - runs the node-label tuning profile validation
//!
//! Labels a worker node, creates a tuning profile that matches the label,
//! checks that the node's parameter converges, and rolls everything back.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
