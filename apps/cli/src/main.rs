//! ResearchKit CLI: browser-driven research and desktop automation.
//!
//! Runs one workflow per invocation against the automation host (or a
//! static HTTP browser) and an OpenAI-compatible chat model.

mod backend;
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
