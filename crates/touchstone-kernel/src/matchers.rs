//! Match dispatch: routing a parameter set to the handler that can
//! resolve it against a working directory.
//!
//! Handlers are registered as an ordered `(predicate, handler)` table;
//! the first predicate accepting the parameter set wins. Each handler
//! returns the extracted value (or `None` when extraction was impossible)
//! together with the declared reference; comparison happens once, here,
//! after dispatch.

use crate::compare::{Mismatch, compare};
use crate::error::HarnessError;
use crate::extract;
use crate::params::ParamSet;
use serde_yaml::Value;
use std::path::Path;
use tracing::debug;

/// The resolved outcome of one match evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEval {
    pub success: bool,
    /// What was actually extracted; `None` means extraction failed
    /// (missing file, out-of-range field) and no comparison ran.
    pub calculated: Option<String>,
    /// Comparison detail for failed matches, when a comparison ran.
    pub mismatch: Option<Mismatch>,
}

type Predicate = fn(&ParamSet) -> bool;
type Handler = fn(&ParamSet, &Path) -> Result<(Option<String>, Value), HarnessError>;

/// Registered handlers in priority order.
const MATCH_HANDLERS: [(Predicate, Handler); 3] = [
    (directory_applies, directory_match),
    (size_applies, size_match),
    (content_applies, content_match),
];

fn directory_applies(params: &ParamSet) -> bool {
    params.contains("directory")
}

fn size_applies(params: &ParamSet) -> bool {
    params.contains("file") && params.contains("size")
}

fn content_applies(params: &ParamSet) -> bool {
    params.contains("file") && !params.contains("size")
}

/// Evaluate one fully resolved parameter set against `work_dir`.
pub fn evaluate_match(params: &ParamSet, work_dir: &Path) -> Result<MatchEval, HarnessError> {
    let Some((_, handler)) = MATCH_HANDLERS.iter().find(|(applies, _)| applies(params)) else {
        return Err(HarnessError::Usage(format!(
            "No registered match handler for params: {params}"
        )));
    };

    let (calculated, reference) = handler(params, work_dir)?;
    let Some(calculated) = calculated else {
        return Ok(MatchEval {
            success: false,
            calculated: None,
            mismatch: None,
        });
    };

    let outcome = compare(&calculated, &reference, params.tolerance());
    Ok(MatchEval {
        success: outcome.success,
        calculated: Some(calculated),
        mismatch: outcome.mismatch,
    })
}

/// Existence and population checks on a directory the program wrote.
fn directory_match(
    params: &ParamSet,
    work_dir: &Path,
) -> Result<(Option<String>, Value), HarnessError> {
    let target = work_dir.join(required_str(params, "directory")?);
    if !target.is_dir() {
        return Ok((Some("False".to_string()), Value::from("True")));
    }

    if params.contains("file_is_present") {
        let name = required_str(params, "file_is_present")?;
        let present = target.join(name).is_file();
        let calculated = if present { "True" } else { "False" };
        return Ok((Some(calculated.to_string()), Value::from("True")));
    }

    if params.contains("count_files") {
        let entries = std::fs::read_dir(&target).map_err(|err| {
            HarnessError::Runtime(format!(
                "Failed to list directory {}: {err}",
                target.display()
            ))
        })?;
        let mut count = 0usize;
        for entry in entries {
            let entry = entry.map_err(|err| {
                HarnessError::Runtime(format!(
                    "Failed to list directory {}: {err}",
                    target.display()
                ))
            })?;
            if entry.path().is_file() {
                count += 1;
            }
        }
        let reference = params.get("count_files").cloned().unwrap_or(Value::Null);
        return Ok((Some(count.to_string()), reference));
    }

    Err(HarnessError::Usage(
        "Directory parameter requires either 'file_is_present' or 'count_files'".to_string(),
    ))
}

/// Byte-length check on a file the program wrote.
fn size_match(params: &ParamSet, work_dir: &Path) -> Result<(Option<String>, Value), HarnessError> {
    let path = work_dir.join(required_str(params, "file")?);
    let calculated = std::fs::metadata(&path).ok().map(|meta| meta.len().to_string());
    let reference = params.get("size").cloned().unwrap_or(Value::Null);
    Ok((calculated, reference))
}

/// Line-oriented extraction from a file the program wrote.
fn content_match(
    params: &ParamSet,
    work_dir: &Path,
) -> Result<(Option<String>, Value), HarnessError> {
    let name = required_str(params, "file")?;
    let content = match std::fs::read(work_dir.join(name)) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            debug!("Error reading file {name}: {err}");
            return Ok((None, Value::Null));
        }
    };
    let lines: Vec<&str> = content.split_inclusive('\n').collect();

    // Occurrence counting outranks single-line extraction.
    if params.contains("grep") && params.contains("count") {
        let pattern = required_str(params, "grep")?;
        let count = lines.iter().filter(|line| line.contains(pattern)).count();
        let reference = params.get("count").cloned().unwrap_or(Value::Null);
        return Ok((Some(count.to_string()), reference));
    }

    let target = if params.contains("grep") {
        let pattern = required_str(params, "grep")?;
        let offset = params.int_param("line")?.unwrap_or(0);
        extract::pattern_line(&lines, pattern, offset)
    } else if params.contains("line") {
        // Line numbers are one-based.
        extract::line_at(&lines, required_int(params, "line")? - 1)
    } else {
        return Err(HarnessError::Usage(
            "Content-based match requires either 'grep' or 'line' parameter".to_string(),
        ));
    };

    let calculated = if params.contains("field") {
        let index = required_int(params, "field")?;
        target
            .and_then(|line| extract::field(line, index))
            .map(str::to_string)
    } else if params.contains("column") {
        let position = required_int(params, "column")?;
        target.and_then(|line| extract::column(line, position))
    } else if params.contains("field_re") && params.contains("field_im") {
        let re_index = required_int(params, "field_re")?;
        let im_index = required_int(params, "field_im")?;
        target.and_then(|line| complex_magnitude(line, re_index, im_index))
    } else {
        return Err(HarnessError::Usage(
            "Content-based match requires 'field', 'column', or both 'field_re' and 'field_im' \
             parameters"
                .to_string(),
        ));
    };

    let Some(reference) = params.get("value") else {
        return Err(HarnessError::Usage(
            "Content-based match requires 'value' parameter for reference value".to_string(),
        ));
    };
    Ok((calculated, reference.clone()))
}

/// Magnitude of a complex number whose real and imaginary parts sit in
/// two whitespace-separated fields of the same line.
fn complex_magnitude(line: &str, re_index: i64, im_index: i64) -> Option<String> {
    let re: f64 = extract::field(line, re_index)?.parse().ok()?;
    let im: f64 = extract::field(line, im_index)?.parse().ok()?;
    Some(format!("{:?}", (re * re + im * im).sqrt()))
}

fn required_str<'a>(params: &'a ParamSet, key: &str) -> Result<&'a str, HarnessError> {
    params
        .str_param(key)?
        .ok_or_else(|| HarnessError::Usage(format!("{key} parameter is required")))
}

fn required_int(params: &ParamSet, key: &str) -> Result<i64, HarnessError> {
    params
        .int_param(key)?
        .ok_or_else(|| HarnessError::Usage(format!("{key} parameter is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamSet, broadcast};
    use serde_yaml::Mapping;
    use std::fs;
    use tempfile::TempDir;

    fn params(yaml: &str) -> ParamSet {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        ParamSet::resolve(&mapping, &ParamSet::default())
    }

    fn workdir_with_results() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("results.txt"),
            "Energy: -42.5000 Ry  0.3  0.4\n\
             Total force: 1.2345e-03 Ha\n\
             Status converged OK\n\
             Iterations 10\n\
             WARNING: step skipped\n\
             WARNING: step skipped\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn grep_and_field_extract_the_value_on_the_matching_line() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: 'Energy:', field: 2, value: -42.5000}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("-42.5000"));
    }

    #[test]
    fn mismatched_value_fails_with_numeric_detail() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: 'Energy:', field: 2, value: 999.9}"),
            dir.path(),
        )
        .unwrap();
        assert!(!eval.success);
        assert!(matches!(eval.mismatch, Some(Mismatch::Numeric { .. })));
    }

    #[test]
    fn tolerance_absorbs_small_drift() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: 'Energy:', field: 2, value: -42.505, tol: 0.01}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
    }

    #[test]
    fn grep_with_count_counts_matching_lines() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: WARNING, count: 2}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("2"));
    }

    #[test]
    fn grep_offset_reaches_neighboring_lines() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: 'Status', line: 1, field: 2, value: 10}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success, "expected the Iterations line one below Status");
    }

    #[test]
    fn line_parameter_is_one_based() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, line: 4, field: 2, value: 10}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
    }

    #[test]
    fn column_extraction_takes_the_token_at_the_position() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, line: 1, column: 9, value: -42.5}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("-42.5000"));
    }

    #[test]
    fn complex_fields_compare_by_magnitude() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: 'Energy:', field_re: 4, field_im: 5, value: 0.5}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("0.5"));
    }

    #[test]
    fn out_of_range_field_is_an_extraction_failure() {
        let dir = workdir_with_results();
        let eval = evaluate_match(
            &params("{file: results.txt, grep: 'Energy:', field: 99, value: 1}"),
            dir.path(),
        )
        .unwrap();
        assert!(!eval.success);
        assert_eq!(eval.calculated, None);
        assert_eq!(eval.mismatch, None);
    }

    #[test]
    fn missing_file_is_an_extraction_failure() {
        let dir = TempDir::new().unwrap();
        let eval = evaluate_match(
            &params("{file: absent.txt, grep: x, field: 1, value: 1}"),
            dir.path(),
        )
        .unwrap();
        assert!(!eval.success);
        assert_eq!(eval.calculated, None);
    }

    #[test]
    fn size_match_reads_the_byte_length() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("blob.bin"), b"0123456789").unwrap();
        let eval =
            evaluate_match(&params("{file: blob.bin, size: 10}"), dir.path()).unwrap();
        assert!(eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("10"));

        let eval = evaluate_match(&params("{file: gone.bin, size: 10}"), dir.path()).unwrap();
        assert!(!eval.success);
        assert_eq!(eval.calculated, None);
    }

    #[test]
    fn missing_directory_reports_false_against_true() {
        let dir = TempDir::new().unwrap();
        let eval = evaluate_match(
            &params("{directory: missing_dir, file_is_present: out.txt}"),
            dir.path(),
        )
        .unwrap();
        assert!(!eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("False"));
        assert_eq!(
            eval.mismatch,
            Some(Mismatch::Text {
                calculated: "False".to_string(),
                expected: "True".to_string(),
            })
        );
    }

    #[test]
    fn file_presence_inside_a_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("output_dir")).unwrap();
        fs::write(dir.path().join("output_dir/found.txt"), "x").unwrap();

        let present = evaluate_match(
            &params("{directory: output_dir, file_is_present: found.txt}"),
            dir.path(),
        )
        .unwrap();
        assert!(present.success);

        let absent = evaluate_match(
            &params("{directory: output_dir, file_is_present: missing.txt}"),
            dir.path(),
        )
        .unwrap();
        assert!(!absent.success);
        assert_eq!(absent.calculated.as_deref(), Some("False"));
    }

    #[test]
    fn count_files_ignores_subdirectories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("output_dir")).unwrap();
        fs::write(dir.path().join("output_dir/a.txt"), "a").unwrap();
        fs::write(dir.path().join("output_dir/b.txt"), "b").unwrap();
        fs::create_dir(dir.path().join("output_dir/nested")).unwrap();

        let eval = evaluate_match(
            &params("{directory: output_dir, count_files: 2}"),
            dir.path(),
        )
        .unwrap();
        assert!(eval.success);
        assert_eq!(eval.calculated.as_deref(), Some("2"));
    }

    #[test]
    fn usage_errors_name_the_missing_parameter() {
        let dir = workdir_with_results();

        let err = evaluate_match(&params("{file: results.txt, field: 2, value: 1}"), dir.path())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content-based match requires either 'grep' or 'line' parameter"
        );

        let err = evaluate_match(&params("{file: results.txt, line: 1, value: 1}"), dir.path())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content-based match requires 'field', 'column', or both 'field_re' and 'field_im' parameters"
        );

        let err = evaluate_match(&params("{file: results.txt, line: 1, field: 2}"), dir.path())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content-based match requires 'value' parameter for reference value"
        );

        let dir2 = TempDir::new().unwrap();
        fs::create_dir(dir2.path().join("d")).unwrap();
        let err = evaluate_match(&params("{directory: d}"), dir2.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Directory parameter requires either 'file_is_present' or 'count_files'"
        );
    }

    #[test]
    fn unroutable_params_are_a_usage_error() {
        let dir = TempDir::new().unwrap();
        let err = evaluate_match(&params("{value: 1.0}"), dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("No registered match handler for params:"));
        assert!(matches!(err, HarnessError::Usage(_)));
    }

    #[test]
    fn non_string_file_is_present_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        let err = evaluate_match(&params("{directory: d, file_is_present: 3}"), dir.path())
            .unwrap_err();
        assert_eq!(err.to_string(), "file_is_present parameter must be a string");
    }

    #[test]
    fn broadcast_sets_evaluate_independently() {
        let dir = workdir_with_results();
        let sets = broadcast(&params(
            "{file: results.txt, grep: ['Energy:', Iterations], field: [2, 2], value: [-42.5, 10]}",
        ))
        .unwrap();
        assert_eq!(sets.len(), 2);
        let evals: Vec<MatchEval> = sets
            .iter()
            .map(|set| evaluate_match(set, dir.path()).unwrap())
            .collect();
        assert!(evals[0].success);
        assert!(evals[1].success);
        assert_eq!(evals[1].calculated.as_deref(), Some("10"));
    }
}
