//! Muster: convoy scheduling and agent-lifecycle orchestration.
//!
//! This is the main entry point for the `muster` CLI. It parses
//! arguments, dispatches to the appropriate command handler, and handles
//! errors with proper exit codes.

mod agent;
mod cli;
mod commands;
mod config;
mod context;
mod dupes;
mod error;
mod events;
mod exit_codes;
mod graph;
mod ledger;
mod plan;
mod respawn;
mod sched;
mod session;
#[cfg(test)]
mod test_support;
mod trigger;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
