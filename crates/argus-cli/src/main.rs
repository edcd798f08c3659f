//! argus command line interface.
//!
//! Exit codes follow the command contract: 0 when the query was decided
//! (REACHABLE, UNREACHABLE, consistency OK or KO), 2 when it stayed
//! undecided, 1 on errors.

use clap::Parser;
use human_panic::setup_panic;
use log::{error, info};

use crate::cli::{initialize_logger, run_init_consistency, run_reach, Cli, EXIT_ERROR};

mod argus_config;
mod cli;

fn main() {
    setup_panic!();

    let cli = Cli::parse();
    if let Err(e) = initialize_logger(cli.log_config) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(EXIT_ERROR);
    }
    info!("argus symbolic reachability checker");

    let outcome = match cli.command {
        cli::Commands::Reach {
            input,
            target,
            forward_constraints,
            backward_constraints,
            constraints,
            config_file,
            timeout,
        } => run_reach(
            input,
            target,
            forward_constraints,
            backward_constraints,
            constraints,
            config_file,
            timeout,
        ),
        cli::Commands::InitConsistency {
            input,
            constraints,
            config_file,
        } => run_init_consistency(input, constraints, config_file),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}
