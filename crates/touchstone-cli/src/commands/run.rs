use crate::runner::{RunOptions, run_test};
use crate::support;
use std::path::PathBuf;
use touchstone_kernel::HarnessError;

pub fn run(
    test_file: PathBuf,
    directory: PathBuf,
    preserve: bool,
    verbose: u8,
    timeout: u64,
    report: Option<PathBuf>,
) -> Result<i32, HarnessError> {
    support::setup_logging(verbose);
    run_test(&RunOptions {
        test_file,
        exec_dir: directory,
        preserve,
        timeout,
        report,
        update: None,
        show_full_output: verbose >= 2,
    })
}
