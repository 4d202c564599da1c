//! MeetingOrder CLI: reconcile calendar meetings against billable work orders.
//!
//! Reads meetings from a calendar screenshot or the calendar page, asks the
//! oracle to match each one to a work order, and exports timed matches to CSV.

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
