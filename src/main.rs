//! Entry point for the `ingot` binary.
//!
//! Parses the command line, installs logging, and drives the requested
//! pipeline operation on a Tokio runtime. All the behaviour lives in the
//! library crate; this binary is argument handling and console output.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Operator-facing output goes to stdout

mod cli;

use clap::Parser as _;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    ingot::logging::init()?;

    let cli = cli::Cli::parse();
    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli.command, cli.work_root))?;
    Ok(())
}
