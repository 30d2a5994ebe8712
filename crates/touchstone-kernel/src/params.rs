//! Reserved match parameters and their resolution.
//!
//! A match specification is a nested YAML mapping. Keys listed in
//! [`RESERVED_KEYS`] carry match parameters and inherit top-down: a value
//! set on a group applies to every descendant leaf unless overridden.
//! Everything else names a child node.

use crate::error::HarnessError;
use serde_yaml::{Mapping, Value};

/// Every key with reserved meaning, in declaration order. This order is
/// also the echo order of match entries in execution reports.
pub const RESERVED_KEYS: [&str; 16] = [
    "match",
    "file",
    "directory",
    "value",
    "size",
    "grep",
    "field",
    "column",
    "line",
    "field_re",
    "field_im",
    "count",
    "count_files",
    "file_is_present",
    "tol",
    "protected",
];

/// Keys that can hold the reference value of a match, in lookup order.
/// The first one present in a parameter set is the reference slot.
pub const REFERENCE_KEYS: [&str; 5] = ["value", "size", "count", "count_files", "file_is_present"];

/// Reference keys that auto-update must never rewrite.
pub const NON_UPDATABLE_KEYS: [&str; 1] = ["file_is_present"];

/// Keys excluded from report echo.
pub const INTERNAL_KEYS: [&str; 2] = ["match", "protected"];

/// Whether `key` is a reserved match parameter rather than a node name.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Whether every key of `node` is reserved, i.e. the node is a leaf match
/// rather than a group of named children. Non-string keys never count as
/// reserved.
pub fn is_leaf(node: &Mapping) -> bool {
    node.keys()
        .all(|k| k.as_str().is_some_and(is_reserved))
}

/// One fully resolved set of match parameters.
///
/// Holds only reserved keys, merged through the scope chain. Construction
/// fixes the contents; broadcasting produces new sets rather than mutating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    map: Mapping,
}

impl ParamSet {
    /// Merge the reserved keys of `local` over `parent`, producing the
    /// parameter scope seen by `local` and its descendants.
    pub fn resolve(local: &Mapping, parent: &ParamSet) -> ParamSet {
        let mut map = Mapping::new();
        for key in RESERVED_KEYS {
            let value = local
                .get(key)
                .or_else(|| parent.map.get(key));
            if let Some(value) = value {
                map.insert(Value::from(key), value.clone());
            }
        }
        ParamSet { map }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate `(key, value)` pairs in reserved-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|k| (k, v)))
    }

    /// The string value of `key`. Present but non-string is a usage error;
    /// the message names the offending key.
    pub fn str_param(&self, key: &str) -> Result<Option<&str>, HarnessError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(HarnessError::Usage(format!(
                "{key} parameter must be a string"
            ))),
        }
    }

    /// The integer value of `key`. Present but non-integer is a usage error.
    pub fn int_param(&self, key: &str) -> Result<Option<i64>, HarnessError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(value) => match value_to_i64(value) {
                Some(n) => Ok(Some(n)),
                None => Err(HarnessError::Usage(format!(
                    "{key} parameter must be an integer"
                ))),
            },
        }
    }

    /// The effective numeric tolerance: absent, unparseable, or zero all
    /// mean exact comparison.
    pub fn tolerance(&self) -> Option<f64> {
        self.map
            .get("tol")
            .and_then(value_to_f64)
            .filter(|t| *t != 0.0)
    }

    /// Truthiness of a flag parameter, absent meaning false.
    pub fn flag(&self, key: &str) -> bool {
        self.map.get(key).is_some_and(is_truthy)
    }

    /// The first reference key present in this set.
    pub fn reference_key(&self) -> Option<&'static str> {
        REFERENCE_KEYS
            .into_iter()
            .find(|key| self.map.contains_key(*key))
    }

    /// The display name used when a broadcast leaf expands to several
    /// sets: the set's own `match` label, falling back to `leaf_name`.
    pub fn display_name(&self, leaf_name: &str) -> String {
        match self.map.get("match") {
            Some(label) => scalar_to_string(label),
            None => leaf_name.to_string(),
        }
    }
}

impl std::fmt::Display for ParamSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Value::String(s) => write!(f, "{key}: {s:?}")?,
                other => write!(f, "{key}: {}", scalar_to_string(other))?,
            }
        }
        write!(f, "}}")
    }
}

/// Expand a parameter set whose values contain lists into one set per
/// list position. Every list must share one length; scalar values repeat
/// unchanged. A set without lists passes through as a singleton.
pub fn broadcast(params: &ParamSet) -> Result<Vec<ParamSet>, HarnessError> {
    let mut length: Option<usize> = None;
    for (_, value) in params.iter() {
        if let Value::Sequence(seq) = value {
            match length {
                None => length = Some(seq.len()),
                Some(n) if n == seq.len() => {}
                Some(_) => {
                    return Err(HarnessError::Usage(
                        "All parameter lists must have the same length".to_string(),
                    ));
                }
            }
        }
    }

    let Some(length) = length else {
        return Ok(vec![params.clone()]);
    };

    let mut sets = Vec::with_capacity(length);
    for i in 0..length {
        let mut map = Mapping::new();
        for (key, value) in params.iter() {
            let projected = match value {
                Value::Sequence(seq) => seq[i].clone(),
                scalar => scalar.clone(),
            };
            map.insert(Value::from(key), projected);
        }
        sets.push(ParamSet { map });
    }
    Ok(sets)
}

/// Render a YAML scalar the way it reads in a terminal line: booleans as
/// `True`/`False`, numbers without quoting, strings verbatim.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        composite => serde_yaml::to_string(composite)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Cast a calculated string onto the scalar type of `reference`, so a
/// value lands in a report or an updated document typed like the value
/// it describes. Failed casts fall back to the raw string.
pub fn cast_like(calculated: &str, reference: &Value) -> Value {
    match reference {
        Value::Bool(_) => match calculated.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::from(calculated),
        },
        Value::Number(n) if n.is_f64() => match calculated.trim().parse::<f64>() {
            Ok(float) => Value::from(float),
            Err(_) => Value::from(calculated),
        },
        Value::Number(_) => match calculated.trim().parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => Value::from(calculated),
        },
        _ => Value::from(calculated),
    }
}

/// Numeric view of a scalar, accepting numbers and numeric strings.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// YAML-scalar truthiness: null, false, zero, and empty collections are
/// false; everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn set(yaml: &str) -> ParamSet {
        ParamSet::resolve(&mapping(yaml), &ParamSet::default())
    }

    #[test]
    fn leaf_is_every_key_reserved() {
        assert!(is_leaf(&mapping("{grep: Energy, field: 2, value: 1.5}")));
        assert!(!is_leaf(&mapping("{energy: {value: 1.5}, tol: 0.1}")));
        assert!(is_leaf(&Mapping::new()));
    }

    #[test]
    fn resolve_prefers_local_over_parent() {
        let parent = set("{file: results.txt, tol: 0.1}");
        let merged = ParamSet::resolve(&mapping("{tol: 0.5, value: 3}"), &parent);
        assert_eq!(merged.get("file"), Some(&Value::from("results.txt")));
        assert_eq!(merged.tolerance(), Some(0.5));
        assert_eq!(merged.get("value"), Some(&Value::from(3)));
    }

    #[test]
    fn resolve_ignores_non_reserved_keys() {
        let merged = ParamSet::resolve(&mapping("{energy: {value: 1}, tol: 0.1}"), &ParamSet::default());
        assert!(merged.get("energy").is_none());
        assert!(merged.contains("tol"));
    }

    #[test]
    fn broadcast_without_lists_is_a_singleton() {
        let params = set("{grep: Energy, value: 1.5}");
        let sets = broadcast(&params).unwrap();
        assert_eq!(sets, vec![params]);
    }

    #[test]
    fn broadcast_projects_each_list_position() {
        let params = set("{file: out.txt, grep: [a, b], value: [1, 2], tol: 0.1}");
        let sets = broadcast(&params).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].get("grep"), Some(&Value::from("a")));
        assert_eq!(sets[1].get("grep"), Some(&Value::from("b")));
        assert_eq!(sets[1].get("value"), Some(&Value::from(2)));
        // scalars repeat into every projected set
        assert_eq!(sets[0].get("file"), Some(&Value::from("out.txt")));
        assert_eq!(sets[1].tolerance(), Some(0.1));
    }

    #[test]
    fn broadcast_rejects_mismatched_lengths() {
        let params = set("{grep: [a, b, c], value: [1, 2]}");
        let err = broadcast(&params).unwrap_err();
        assert_eq!(
            err.to_string(),
            "All parameter lists must have the same length"
        );
    }

    #[test]
    fn reference_key_takes_first_present() {
        assert_eq!(set("{value: 1, count: 2}").reference_key(), Some("value"));
        assert_eq!(set("{count_files: 3}").reference_key(), Some("count_files"));
        assert_eq!(set("{grep: x}").reference_key(), None);
    }

    #[test]
    fn display_name_prefers_the_match_label() {
        assert_eq!(set("{match: energy, value: 1}").display_name("leaf"), "energy");
        assert_eq!(set("{value: 1}").display_name("leaf"), "leaf");
        assert_eq!(set("{match: 7, value: 1}").display_name("leaf"), "7");
    }

    #[test]
    fn scalars_render_like_terminal_text() {
        assert_eq!(scalar_to_string(&Value::from(true)), "True");
        assert_eq!(scalar_to_string(&Value::from(false)), "False");
        assert_eq!(scalar_to_string(&Value::from(-42.5)), "-42.5");
        assert_eq!(scalar_to_string(&Value::from("ok")), "ok");
    }

    #[test]
    fn tolerance_treats_zero_as_exact() {
        assert_eq!(set("{tol: 0}").tolerance(), None);
        assert_eq!(set("{tol: 0.005}").tolerance(), Some(0.005));
        assert_eq!(set("{value: 1}").tolerance(), None);
    }

    #[test]
    fn cast_like_follows_the_reference_type() {
        assert_eq!(cast_like("10", &Value::from(7)), Value::from(10));
        assert_eq!(cast_like("-42.505", &Value::from(1.0)), Value::from(-42.505));
        assert_eq!(cast_like("True", &Value::from(false)), Value::from(true));
        assert_eq!(cast_like("3", &Value::from("three")), Value::from("3"));
        // unparseable casts keep the raw string
        assert_eq!(cast_like("10.5", &Value::from(7)), Value::from("10.5"));
        assert_eq!(cast_like("maybe", &Value::from(true)), Value::from("maybe"));
    }

    #[test]
    fn string_params_reject_other_scalars() {
        let params = set("{file_is_present: 3}");
        let err = params.str_param("file_is_present").unwrap_err();
        assert_eq!(err.to_string(), "file_is_present parameter must be a string");
        assert_eq!(set("{file_is_present: out.txt}").str_param("file_is_present").unwrap(), Some("out.txt"));
    }
}
