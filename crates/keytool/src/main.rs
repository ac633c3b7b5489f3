//! `waas-keytool`: operator CLI for the WaaS request envelope.
//!
//! Startup sequence:
//! 1. Parse arguments; key arguments fall back to `WAAS_*` environment variables.
//! 2. Initialise structured JSON logging on stderr.
//! 3. Run the subcommand, writing its result to stdout.

mod commands;

use anyhow::Result;
use clap::Parser;

use commands::Cli;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Arguments
    // -----------------------------------------------------------------------
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    waas_envelope::telemetry::init(&cli.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Command
    // -----------------------------------------------------------------------
    let output = commands::run(cli.command)?;
    println!("{output}");
    Ok(())
}
