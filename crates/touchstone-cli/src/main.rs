//! Touchstone CLI: the `touchstone` command.

mod cli;
mod commands;
mod executor;
mod format;
mod report;
mod runner;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use touchstone_kernel::{HarnessError, exit};

fn main() {
    let Cli { command } = Cli::parse();
    let outcome = std::panic::catch_unwind(move || dispatch(command));
    let code = match outcome {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            tracing::error!("{err}");
            err.exit_code()
        }
        Err(_) => {
            tracing::error!("internal error");
            exit::INTERNAL
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Commands) -> Result<i32, HarnessError> {
    match command {
        Commands::Run {
            test_file,
            directory,
            preserve,
            verbose,
            timeout,
            report,
        } => commands::run::run(test_file, directory, preserve, verbose, timeout, report),

        Commands::Update {
            test_file,
            directory,
            verbose,
            timeout,
            tolerance,
            reference,
            output,
        } => commands::update::run(
            test_file, directory, verbose, timeout, tolerance, reference, output,
        ),
    }
}
