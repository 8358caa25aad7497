//! Lorebook CLI: incremental champion lore harvester.
//!
//! Harvests champion records per language into a local database, keeps hero
//! images under a byte budget, and writes the summary the publication builder
//! reads.

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
