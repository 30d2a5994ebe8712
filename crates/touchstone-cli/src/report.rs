use serde_yaml::{Mapping, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use touchstone_config::{InputScope, TestConfig};
use touchstone_kernel::{HarnessError, INTERNAL_KEYS, MatchNode, ParamSet, cast_like};
use tracing::info;

/// The key a run reports under: the test file path as given on the command
/// line, without a leading `./`.
pub fn report_key(path: &Path) -> String {
    let text = path.to_string_lossy();
    text.strip_prefix("./").unwrap_or(&text).to_string()
}

/// The per-input report entry, before `Matches` is attached.
pub fn build_input_entry(scope: &InputScope<'_>, success: bool, elapsed: f64) -> Mapping {
    let mut entry = Mapping::new();
    entry.insert(
        "InputMethod".into(),
        scope
            .get("InputMethod")
            .cloned()
            .unwrap_or_else(|| Value::from("argument")),
    );
    entry.insert(
        "ExpectedFailure".into(),
        scope
            .get("ExpectedFailure")
            .cloned()
            .unwrap_or(Value::Bool(false)),
    );
    entry.insert(
        "Execution".into(),
        Value::from(if success { "pass" } else { "fail" }),
    );
    entry.insert(
        "Elapsed time".into(),
        Value::from((elapsed * 1000.0).round() / 1000.0),
    );
    if let Some(processors) = scope.get("Processors") {
        entry.insert("Processors".into(), processors.clone());
    }
    entry
}

/// Mirror the evaluated tree as nested mappings, one entry per evaluated
/// set keyed by its display name.
pub fn build_match_tree(nodes: &[MatchNode]) -> Mapping {
    let mut results = Mapping::new();
    for node in nodes {
        match node {
            MatchNode::Group { name, children } => {
                results.insert(
                    Value::from(name.as_str()),
                    Value::Mapping(build_match_tree(children)),
                );
            }
            MatchNode::Leaf { sets, .. } => {
                for set in sets {
                    results.insert(
                        Value::from(set.display_name.as_str()),
                        Value::Mapping(build_match_entry(&set.params, set.calculated.as_deref())),
                    );
                }
            }
        }
    }
    results
}

/// Echo one evaluated set's parameters in reserved-key order. The
/// reference key's slot carries the calculated value cast to the
/// reference's scalar type, with the original kept under `reference`;
/// a failed extraction leaves the slot null.
pub fn build_match_entry(params: &ParamSet, calculated: Option<&str>) -> Mapping {
    let reference_key = params.reference_key();
    let mut entry = Mapping::new();
    for (key, value) in params.iter() {
        if INTERNAL_KEYS.contains(&key) {
            continue;
        }
        if Some(key) == reference_key {
            let calculated = match calculated {
                Some(text) => cast_like(text, value),
                None => Value::Null,
            };
            entry.insert(Value::from(key), calculated);
            entry.insert(Value::from("reference"), value.clone());
        } else {
            entry.insert(Value::from(key), value.clone());
        }
    }
    entry
}

/// Append this run's document to the report file. Each run contributes a
/// `---`-prefixed document keyed by the test file path.
pub fn write(report_file: &Path, config: &TestConfig, inputs: Mapping) -> Result<(), HarnessError> {
    let mut body = Mapping::new();
    body.insert("Name".into(), Value::from(config.name()?));
    body.insert(
        "Enabled".into(),
        config
            .root()
            .get("Enabled")
            .cloned()
            .unwrap_or(Value::Bool(true)),
    );
    body.insert(
        "Executable".into(),
        config
            .root()
            .get("Executable")
            .cloned()
            .unwrap_or_else(|| Value::from("")),
    );
    body.insert("Inputs".into(), Value::Mapping(inputs));

    let mut doc = Mapping::new();
    doc.insert(Value::from(report_key(config.path())), Value::Mapping(body));
    let text = serde_yaml::to_string(&doc)
        .map_err(|err| HarnessError::Runtime(format!("Failed to serialize report: {err}")))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(report_file)
        .map_err(|err| {
            HarnessError::Runtime(format!(
                "Failed to open report file {}: {err}",
                report_file.display()
            ))
        })?;
    file.write_all(format!("---\n{text}").as_bytes())
        .map_err(|err| HarnessError::Runtime(format!("Failed to write report: {err}")))?;

    info!("Report written to {}", report_file.display());
    Ok(())
}
