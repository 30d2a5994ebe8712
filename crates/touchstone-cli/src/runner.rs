use crate::executor::Executor;
use crate::format::{self, Palette};
use crate::report;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::PathBuf;
use touchstone_config::{PatchDocument, TestConfig, UpdateMode, apply_updates};
use touchstone_kernel::{HarnessError, WalkOutcome, exit, scalar_to_string, walk_matches};
use tracing::{debug, info};

pub struct RunOptions {
    pub test_file: PathBuf,
    pub exec_dir: PathBuf,
    pub preserve: bool,
    pub timeout: u64,
    pub report: Option<PathBuf>,
    pub update: Option<UpdateRequest>,
    pub show_full_output: bool,
}

pub struct UpdateRequest {
    pub mode: UpdateMode,
    pub output: Option<PathBuf>,
}

/// One input's evaluated matches, kept for the update pass.
struct WalkedInput {
    name: String,
    prefix: Vec<String>,
    outcome: WalkOutcome,
}

/// Run one test end to end: execute every input, evaluate the matches,
/// print the summary, and honor the report and update options. Returns
/// the process exit code.
pub fn run_test(options: &RunOptions) -> Result<i32, HarnessError> {
    let palette = Palette::detect();
    let executor = Executor::new(palette, options.show_full_output);
    let config = TestConfig::load(&options.test_file)?;

    println!("{}", format::banner(&palette, config.name()?));
    if !config.enabled() {
        println!("Test disabled: skipping test");
        return Ok(exit::OK);
    }

    let test_dir = config.test_directory()?;
    let work_dir = tempfile::Builder::new()
        .prefix("touchstone_")
        .tempdir()
        .map_err(|err| {
            HarnessError::Runtime(format!("Failed to create working directory: {err}"))
        })?
        .keep();
    println!("Using workdir: {}", work_dir.display());

    let mut failed_executions = 0usize;
    let mut total_matches = 0usize;
    let mut failed_matches = 0usize;
    let mut report_inputs = Mapping::new();
    let mut walked = Vec::new();

    let input_names: Vec<String> = config.inputs()?.keys().map(scalar_to_string).collect();
    println!("Inputs:");
    for name in &input_names {
        println!("{}{name}:", format::indent(1));

        let scope = config.input_scope(name)?;
        let expected_failure = scope.flag("ExpectedFailure");
        let execution = executor.execute(
            &scope,
            name,
            &test_dir,
            &options.exec_dir,
            &work_dir,
            expected_failure,
            options.timeout,
        )?;
        println!("{}Elapsed time: {:.3}s", format::indent(2), execution.elapsed);

        let success = if expected_failure {
            !execution.success
        } else {
            execution.success
        };
        let label = if expected_failure {
            "Failed execution"
        } else {
            "Execution"
        };
        println!("{}", format::status_line(&palette, label, success, 2));
        if !success {
            failed_executions += 1;
        }

        let mut entry = report::build_input_entry(&scope, success, execution.elapsed);
        if success {
            println!("{}Matches:", format::indent(2));
            let mut results = Mapping::new();
            if let Some((prefix, matches_root)) = scope.matches_location(name)? {
                let outcome = walk_matches(matches_root, &work_dir)?;
                print!("{}", format::render_match_tree(&palette, &outcome.nodes, 3));
                total_matches += outcome.total;
                failed_matches += outcome.failed;
                results = report::build_match_tree(&outcome.nodes);
                walked.push(WalkedInput {
                    name: name.clone(),
                    prefix,
                    outcome,
                });
            }
            entry.insert("Matches".into(), Value::Mapping(results));
        }
        report_inputs.insert(Value::from(name.as_str()), Value::Mapping(entry));
    }

    println!("Test Summary:");
    println!("{}Failed executions : {failed_executions:>5}", format::indent(1));
    println!("{}Total matches     : {total_matches:>5}", format::indent(1));
    println!("{}Failed matches    : {failed_matches:>5}", format::indent(1));

    if options.preserve {
        debug!("Preserved working directory: {}", work_dir.display());
    } else {
        let _ = fs::remove_dir_all(&work_dir);
        debug!("Removed working directory: {}", work_dir.display());
    }

    let exit_code = if failed_executions == 0 && failed_matches == 0 {
        exit::OK
    } else {
        exit::TEST_FAILURE
    };

    if let Some(report_file) = &options.report {
        report::write(report_file, &config, report_inputs)?;
    }
    if let Some(update) = &options.update {
        apply_config_updates(&config, &walked, update)?;
    }

    Ok(exit_code)
}

/// Patch the test document from the walked outcomes and write it back,
/// leaving the file untouched when nothing changed.
fn apply_config_updates(
    config: &TestConfig,
    walked: &[WalkedInput],
    update: &UpdateRequest,
) -> Result<(), HarnessError> {
    let mut doc = PatchDocument::new(config.text());
    for input in walked {
        let scope = config.input_scope(&input.name)?;
        let Some((_, matches_root)) = scope.matches_location(&input.name)? else {
            continue;
        };
        apply_updates(&mut doc, &input.prefix, matches_root, &input.outcome, update.mode)?;
    }
    if doc.is_modified() {
        let dest = update.output.as_deref().unwrap_or_else(|| config.path());
        fs::write(dest, doc.text()).map_err(|err| {
            HarnessError::Runtime(format!(
                "Failed to write updated config to {}: {err}",
                dest.display()
            ))
        })?;
        info!("Updated config written to {}", dest.display());
    }
    Ok(())
}
