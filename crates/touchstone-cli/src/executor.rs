use crate::format::{self, Palette};
use serde_yaml::Value;
use std::ffi::OsString;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use touchstone_config::InputScope;
use touchstone_kernel::{HarnessError, scalar_to_string};
use tracing::{debug, info};

/// Outcome of one input's execution.
pub struct Execution {
    pub success: bool,
    pub elapsed: f64,
}

/// Stages one input into the working directory, runs the executable under
/// the timeout, and captures its stdout/stderr as files for the matchers.
pub struct Executor {
    palette: Palette,
    show_full_output: bool,
}

impl Executor {
    pub fn new(palette: Palette, show_full_output: bool) -> Executor {
        Executor {
            palette,
            show_full_output,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &self,
        scope: &InputScope<'_>,
        input: &str,
        test_dir: &Path,
        exec_dir: &Path,
        work_dir: &Path,
        expected_failure: bool,
        timeout: u64,
    ) -> Result<Execution, HarnessError> {
        let name = scope
            .get("Executable")
            .map(scalar_to_string)
            .unwrap_or_default();
        let executable = resolve_executable(&name, exec_dir)?;

        let method = match scope.get("InputMethod") {
            None => "argument".to_string(),
            Some(value) => scalar_to_string(value),
        };
        let staged = stage_files(scope, input, &method, test_dir, work_dir)?;

        let mut argv = mpi_prefix(scope);
        let (command, use_stdin) = build_command(&method, &executable, &staged)?;
        argv.extend(command);

        let start = Instant::now();
        let status = run_child(&argv, use_stdin, &staged, work_dir, timeout);
        let elapsed = start.elapsed().as_secs_f64();

        let success = match status {
            Ok(Some(status)) if status.success() => true,
            Ok(Some(status)) => {
                debug!(
                    "Executable failed with exit code {}",
                    status.code().unwrap_or(-1)
                );
                false
            }
            Ok(None) => {
                debug!("Test execution timed out after {timeout} seconds");
                false
            }
            Err(err) => {
                debug!("Test execution failed: {err}");
                false
            }
        };

        if !success && !expected_failure {
            print!(
                "{}",
                format::captured_output(&self.palette, work_dir, input, self.show_full_output)
            );
        }
        if success {
            if let Ok(bytes) = std::fs::read(work_dir.join("stderr")) {
                let content = String::from_utf8_lossy(&bytes);
                if !content.is_empty() {
                    debug!("STDERR: {content}");
                }
            }
        }
        if !use_stdin {
            let _ = std::fs::remove_file(work_dir.join(&staged));
        }

        Ok(Execution { success, elapsed })
    }
}

fn resolve_executable(name: &str, exec_dir: &Path) -> Result<PathBuf, HarnessError> {
    let path = exec_dir.join(name);
    if !path.is_file() {
        return Err(HarnessError::Runtime(format!(
            "Executable '{name}' not available at {}",
            path.display()
        )));
    }
    let metadata = path.metadata().map_err(|err| {
        HarnessError::Runtime(format!("Failed to inspect {}: {err}", path.display()))
    })?;
    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(HarnessError::Runtime(format!(
            "Executable '{name}' is not executable"
        )));
    }
    if path.is_absolute() {
        Ok(path)
    } else {
        std::path::absolute(&path).map_err(|err| {
            HarnessError::Runtime(format!("Failed to resolve {}: {err}", path.display()))
        })
    }
}

/// Copy the input (and any `ExtraFiles`) from the test directory into the
/// working directory, returning the staged input's working name.
fn stage_files(
    scope: &InputScope<'_>,
    input: &str,
    method: &str,
    test_dir: &Path,
    work_dir: &Path,
) -> Result<String, HarnessError> {
    let source = test_dir.join(input);
    if !source.exists() {
        return Err(HarnessError::Runtime(format!(
            "Input file not found: {}",
            source.display()
        )));
    }

    let staged = match scope.get_str("RenameTo") {
        Some(target) if method == "rename" => {
            copy_into(&source, &work_dir.join(target))?;
            debug!("Copied input file: {input} -> {target}");
            target.to_string()
        }
        _ => {
            copy_into(&source, &work_dir.join(input))?;
            debug!("Copied input file: {input}");
            input.to_string()
        }
    };

    if let Some(extras) = scope.get("ExtraFiles") {
        let Value::Sequence(extras) = extras else {
            return Err(HarnessError::Usage(
                "ExtraFiles must be a list of file names".to_string(),
            ));
        };
        for extra in extras {
            let extra = scalar_to_string(extra);
            let source = test_dir.join(&extra);
            if !source.exists() {
                return Err(HarnessError::Runtime(format!(
                    "Extra file not found: {}",
                    source.display()
                )));
            }
            let target = source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(&extra));
            copy_into(&source, &work_dir.join(target))?;
            debug!("Copied extra file: {extra}");
        }
    }

    Ok(staged)
}

fn copy_into(source: &Path, target: &Path) -> Result<(), HarnessError> {
    std::fs::copy(source, target).map_err(|err| {
        HarnessError::Runtime(format!(
            "Failed to copy {} into the working directory: {err}",
            source.display()
        ))
    })?;
    Ok(())
}

/// The argv for one input method, plus whether the staged input feeds the
/// child's stdin.
fn build_command(
    method: &str,
    executable: &Path,
    staged: &str,
) -> Result<(Vec<OsString>, bool), HarnessError> {
    match method {
        "argument" => {
            info!("Executing: {} {staged}", executable.display());
            Ok((vec![executable.into(), staged.into()], false))
        }
        "stdin" => {
            info!("Executing: {} < {staged}", executable.display());
            Ok((vec![executable.into()], true))
        }
        "rename" => {
            info!(
                "Executing: {} (with {staged} in working directory)",
                executable.display()
            );
            Ok((vec![executable.into()], false))
        }
        other => Err(HarnessError::Usage(format!(
            "Unknown input method: {other}"
        ))),
    }
}

/// The `mpiexec {flag} {processors}` prefix when the MPIEXEC environment
/// variable names a launcher.
fn mpi_prefix(scope: &InputScope<'_>) -> Vec<OsString> {
    let Some(launcher) = std::env::var("MPIEXEC").ok().filter(|v| !v.is_empty()) else {
        return Vec::new();
    };
    let processors = scope
        .get("Processors")
        .map(scalar_to_string)
        .unwrap_or_else(|| "1".to_string());
    let flag = launcher_flag(&launcher);
    vec![launcher.into(), flag.into(), processors.into()]
}

/// Slurm and Cray launchers spell the process-count flag `-n`; the MPICH
/// and OpenMPI family use `-np`.
fn launcher_flag(launcher: &str) -> &'static str {
    let name = Path::new(launcher)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.contains("srun") || name.contains("aprun") {
        "-n"
    } else {
        "-np"
    }
}

/// Run the child with stdout/stderr captured to files in the working
/// directory. `Ok(None)` means the timeout expired and the child was killed.
fn run_child(
    argv: &[OsString],
    use_stdin: bool,
    staged: &str,
    work_dir: &Path,
    timeout: u64,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let stdout = File::create(work_dir.join("stdout"))?;
    let stderr = File::create(work_dir.join("stderr"))?;
    let stdin = if use_stdin {
        Stdio::from(File::open(work_dir.join(staged))?)
    } else {
        Stdio::null()
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(work_dir)
            .stdin(stdin)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;
        match tokio::time::timeout(Duration::from_secs(timeout), child.wait()).await {
            Ok(status) => status.map(Some),
            Err(_) => {
                let _ = child.kill().await;
                Ok(None)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn executables_must_exist_and_carry_the_exec_bit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = resolve_executable("solver", dir.path()).unwrap_err();
        assert!(err.to_string().contains("Executable 'solver' not available at"));

        let path = dir.path().join("solver");
        fs::write(&path, "#!/bin/sh\n").expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");
        let err = resolve_executable("solver", dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Executable 'solver' is not executable");

        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        let resolved = resolve_executable("solver", dir.path()).expect("resolve");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("solver"));
    }

    #[test]
    fn command_shape_follows_the_input_method() {
        let exe = Path::new("/opt/bin/solver");

        let (argv, stdin) = build_command("argument", exe, "run.inp").expect("argument");
        assert_eq!(
            argv,
            vec![OsString::from("/opt/bin/solver"), OsString::from("run.inp")]
        );
        assert!(!stdin);

        let (argv, stdin) = build_command("stdin", exe, "run.inp").expect("stdin");
        assert_eq!(argv, vec![OsString::from("/opt/bin/solver")]);
        assert!(stdin);

        let (argv, stdin) = build_command("rename", exe, "solver.in").expect("rename");
        assert_eq!(argv, vec![OsString::from("/opt/bin/solver")]);
        assert!(!stdin);

        let err = build_command("carrier-pigeon", exe, "run.inp").unwrap_err();
        assert_eq!(err.to_string(), "Unknown input method: carrier-pigeon");
    }

    #[test]
    fn launcher_flag_matches_the_scheduler_family() {
        assert_eq!(launcher_flag("/usr/bin/mpiexec"), "-np");
        assert_eq!(launcher_flag("mpirun"), "-np");
        assert_eq!(launcher_flag("/opt/slurm/bin/srun"), "-n");
        assert_eq!(launcher_flag("aprun"), "-n");
    }
}
