use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "touchstone",
    about = "Regression testing utility for scientific software",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a regression test
    Run {
        /// YAML file describing the test to run
        test_file: PathBuf,

        /// Directory containing the executables
        #[arg(short = 'D', long, default_value = ".")]
        directory: PathBuf,

        /// Preserve working directory after test
        #[arg(short, long)]
        preserve: bool,

        /// Increase verbosity (-v for INFO, -vv for DEBUG)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Execution timeout in seconds
        #[arg(short, long, default_value_t = 600)]
        timeout: u64,

        /// Append a YAML execution report to FILE
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Run regression tests and update the YAML config to fix match failures
    #[command(group(ArgGroup::new("mode").required(true)))]
    Update {
        /// YAML file describing the test to run
        test_file: PathBuf,

        /// Directory containing the executables
        #[arg(short = 'D', long, default_value = ".")]
        directory: PathBuf,

        /// Increase verbosity (-v for INFO, -vv for DEBUG)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Execution timeout in seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,

        /// Update tolerances to cover observed differences
        #[arg(short, long, group = "mode")]
        tolerance: bool,

        /// Update reference values to match calculated values
        #[arg(short, long, group = "mode")]
        reference: bool,

        /// Write updated config to FILE instead of overwriting the original
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}
