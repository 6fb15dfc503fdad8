//! Flashnotes CLI: unattended video-to-notes ingestion.
//!
//! Polls a channel for new uploads that follow a naming convention,
//! summarizes their transcripts, and stores the summaries as notes.

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
