//! Loading test specifications and resolving per-input scopes.
//!
//! A specification names the executable, the inputs to run it against,
//! and the matches to evaluate afterwards. Settings chain outward: a key
//! looked up for an input resolves against the input's own mapping first,
//! then the `Inputs` mapping, then the document root.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use touchstone_kernel::HarnessError;

/// A loaded test specification: the parsed value tree for evaluation and
/// the raw text for formatting-preserving updates.
#[derive(Debug, Clone)]
pub struct TestConfig {
    path: PathBuf,
    text: String,
    root: Mapping,
}

impl TestConfig {
    pub fn load(path: &Path) -> Result<TestConfig, HarnessError> {
        if !path.is_file() {
            return Err(HarnessError::Config(format!(
                "Test file not found: {}",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)
            .map_err(|err| HarnessError::Config(format!("Failed to load test file: {err}")))?;
        let parsed: Value = serde_yaml::from_str(&text)
            .map_err(|err| HarnessError::Config(format!("Failed to load test file: {err}")))?;
        let Value::Mapping(root) = parsed else {
            return Err(HarnessError::Config(
                "Failed to load test file: top level is not a mapping".to_string(),
            ));
        };
        Ok(TestConfig {
            path: path.to_path_buf(),
            text,
            root,
        })
    }

    /// The path exactly as given on the command line.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw document text as loaded.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn name(&self) -> Result<&str, HarnessError> {
        self.root
            .get("Name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                HarnessError::Config("Test file is missing a 'Name' entry".to_string())
            })
    }

    /// Tests are enabled unless the document says otherwise.
    pub fn enabled(&self) -> bool {
        self.root
            .get("Enabled")
            .is_none_or(touchstone_kernel::is_truthy)
    }

    pub fn executable(&self) -> Option<&str> {
        self.root.get("Executable").and_then(Value::as_str)
    }

    /// The directory input and extra files are staged from: the resolved
    /// parent of the test file.
    pub fn test_directory(&self) -> Result<PathBuf, HarnessError> {
        let resolved = self.path.canonicalize().map_err(|err| {
            HarnessError::Config(format!("Failed to resolve test file path: {err}"))
        })?;
        resolved
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                HarnessError::Config("Test file has no parent directory".to_string())
            })
    }

    pub fn inputs(&self) -> Result<&Mapping, HarnessError> {
        match self.root.get("Inputs") {
            Some(Value::Mapping(inputs)) => Ok(inputs),
            Some(_) => Err(HarnessError::Config(
                "Test file entry 'Inputs' must be a mapping".to_string(),
            )),
            None => Err(HarnessError::Config(
                "Test file is missing an 'Inputs' entry".to_string(),
            )),
        }
    }

    /// The resolution scope of one input.
    pub fn input_scope(&self, name: &str) -> Result<InputScope<'_>, HarnessError> {
        let inputs = self.inputs()?;
        let input = match inputs.get(name) {
            Some(Value::Mapping(mapping)) => Some(mapping),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(HarnessError::Config(format!(
                    "Input '{name}' must be a mapping"
                )));
            }
        };
        Ok(InputScope {
            input,
            inputs,
            root: &self.root,
        })
    }
}

/// Chained lookup for one input: input mapping, then `Inputs`, then the
/// document root.
#[derive(Debug, Clone, Copy)]
pub struct InputScope<'a> {
    input: Option<&'a Mapping>,
    inputs: &'a Mapping,
    root: &'a Mapping,
}

impl<'a> InputScope<'a> {
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.input
            .and_then(|mapping| mapping.get(key))
            .or_else(|| self.inputs.get(key))
            .or_else(|| self.root.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(touchstone_kernel::is_truthy)
    }

    /// The `Matches` subtree this input evaluates, with the document path
    /// leading to it. The nearest scope level that defines `Matches`
    /// shadows the outer ones; an explicitly empty entry means no matches.
    pub fn matches_location(
        &self,
        input_name: &str,
    ) -> Result<Option<(Vec<String>, &'a Mapping)>, HarnessError> {
        let levels: [(Option<&Value>, &[&str]); 3] = [
            (
                self.input.and_then(|mapping| mapping.get("Matches")),
                &["Inputs", input_name, "Matches"],
            ),
            (self.inputs.get("Matches"), &["Inputs", "Matches"]),
            (self.root.get("Matches"), &["Matches"]),
        ];
        for (value, prefix) in levels {
            match value {
                None => continue,
                Some(Value::Null) => return Ok(None),
                Some(Value::Mapping(mapping)) => {
                    let prefix = prefix.iter().map(|s| s.to_string()).collect();
                    return Ok(Some((prefix, mapping)));
                }
                Some(_) => {
                    return Err(HarnessError::Usage(
                        "Matches must be a mapping of named match nodes".to_string(),
                    ));
                }
            }
        }
        Ok(None)
    }
}
