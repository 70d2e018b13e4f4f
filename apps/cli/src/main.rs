//! TicketDesk CLI — support-ticket triage from the terminal.
//!
//! Turns a client complaint into a developer note and a client reply,
//! grounded in previously archived complaints.

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
