//! refsync CLI — pull knowledge-base records, refresh their content from the
//! referenced sources, and push updates back to the remote store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::run(cli).await
}
