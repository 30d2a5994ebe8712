use crate::runner::{RunOptions, UpdateRequest, run_test};
use crate::support;
use std::path::PathBuf;
use touchstone_config::UpdateMode;
use touchstone_kernel::HarnessError;

pub fn run(
    test_file: PathBuf,
    directory: PathBuf,
    verbose: u8,
    timeout: u64,
    tolerance: bool,
    reference: bool,
    output: Option<PathBuf>,
) -> Result<i32, HarnessError> {
    support::setup_logging(verbose);
    let mode = if tolerance {
        UpdateMode::Tolerance
    } else if reference {
        UpdateMode::Reference
    } else {
        return Err(HarnessError::Usage(
            "one of --tolerance or --reference is required".to_string(),
        ));
    };
    run_test(&RunOptions {
        test_file,
        exec_dir: directory,
        preserve: false,
        timeout,
        report: None,
        update: Some(UpdateRequest { mode, output }),
        show_full_output: verbose >= 2,
    })
}
