//! EAScope CLI: environmental assessment scoping for mining projects.
//!
//! Runs the scoping stages for a proposed project and prints the structured
//! response as JSON.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
