//! Auto-update of reference values and tolerances.
//!
//! After an update-mode run, failed matches feed back into the test
//! document. Reference mode rewrites stale reference values with what the
//! program actually produced; tolerance mode widens (or introduces) `tol`
//! so the observed difference would pass. All edits go through
//! [`PatchDocument`], so untouched lines survive byte for byte.
//!
//! Replacement scalars keep the shape of the token they displace: a float
//! written with four decimal places is rewritten with four decimal places,
//! an integer stays an integer, and a value that will not parse as the
//! reference's type is quoted so YAML keeps it a string.

use crate::patch::{PatchDocument, locate_failure};
use serde_yaml::{Mapping, Value};
use touchstone_kernel::params::value_to_f64;
use touchstone_kernel::{
    EvaluatedMatch, HarnessError, MatchNode, NON_UPDATABLE_KEYS, ParamSet, REFERENCE_KEYS,
    WalkOutcome, scalar_to_string,
};

/// Which side of a failed comparison the update rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Widen `tol` to cover the observed difference.
    Tolerance,
    /// Replace the reference value with the calculated one.
    Reference,
}

/// Fold one input's evaluated matches back into the document.
///
/// `prefix` is the key path from the document root to `matches_root`, the
/// mapping the walk evaluated. Returns whether any edit was applied;
/// protected sets, non-updatable references, and already-passing matches
/// leave the document untouched.
pub fn apply_updates(
    doc: &mut PatchDocument,
    prefix: &[String],
    matches_root: &Mapping,
    outcome: &WalkOutcome,
    mode: UpdateMode,
) -> Result<bool, HarnessError> {
    let mut modified = false;
    for node in outcome.leaves() {
        let MatchNode::Leaf { path, sets, .. } = node else {
            continue;
        };
        let Some(leaf) = leaf_mapping(matches_root, path) else {
            continue;
        };
        let own_ref = REFERENCE_KEYS.into_iter().find(|key| leaf.contains_key(*key));
        if own_ref.is_some_and(|key| NON_UPDATABLE_KEYS.contains(&key)) {
            continue;
        }
        let doc_path: Vec<String> = prefix.iter().chain(path.iter()).cloned().collect();
        modified |= match mode {
            UpdateMode::Tolerance => update_tolerance(doc, &doc_path, sets)?,
            UpdateMode::Reference => update_reference(doc, &doc_path, leaf, own_ref, sets)?,
        };
    }
    Ok(modified)
}

/// Widen an observed difference into a tolerance that would cover it.
///
/// The difference is padded by 10% and ceiled upward to two significant
/// figures, so noise just under the observed level still passes and the
/// written value stays readable.
pub fn compute_tolerance(difference: f64) -> f64 {
    let difference = difference.abs();
    if difference == 0.0 {
        return 0.0;
    }
    let padded = difference * 1.1;
    let magnitude = padded.log10().floor() as i32;
    let factor = 10f64.powi(magnitude - 1);
    let raw = (padded / factor).ceil() * factor;
    let scale = 10f64.powi(-(magnitude - 1));
    (raw * scale).round() / scale
}

/// The textual states a leaf's `tol` entry moves between while failed
/// sets are folded in. Edits are emitted once, after the last set.
#[derive(Debug, Clone, PartialEq)]
enum TolText {
    Absent,
    Scalar(String),
    List(Vec<String>),
}

fn update_tolerance(
    doc: &mut PatchDocument,
    path: &[String],
    sets: &[EvaluatedMatch],
) -> Result<bool, HarnessError> {
    let total = sets.len();
    let initial = read_tolerance(doc, path);
    let mut state = initial.clone();

    for set in sets {
        if set.success || set.params.flag("protected") {
            continue;
        }
        let Some(calculated) = set.calculated.as_deref() else {
            continue;
        };
        let Ok(calculated) = calculated.trim().parse::<f64>() else {
            continue;
        };
        let reference = set
            .params
            .reference_key()
            .and_then(|key| set.params.get(key))
            .and_then(value_to_f64);
        let Some(reference) = reference else {
            continue;
        };
        let difference = (calculated - reference).abs();
        if difference == 0.0 {
            continue;
        }

        let rendered = format!("{:?}", compute_tolerance(difference));
        if total > 1 {
            let mut elements = match &state {
                TolText::List(elements) => elements.clone(),
                TolText::Scalar(token) => vec![token.clone(); total],
                TolText::Absent => vec![inherited_tol_token(&set.params); total],
            };
            if let Some(slot) = elements.get_mut(set.index) {
                *slot = rendered;
            }
            state = TolText::List(elements);
        } else {
            state = TolText::Scalar(rendered);
        }
    }

    if state == initial {
        return Ok(false);
    }
    match (&initial, &state) {
        (TolText::Absent, TolText::Scalar(token)) => doc.insert_key(path, "tol", token)?,
        (TolText::Absent, TolText::List(elements)) => {
            doc.insert_key(path, "tol", &flow_list(elements))?;
        }
        (TolText::List(old), TolText::List(new)) => {
            for (index, (before, after)) in old.iter().zip(new).enumerate() {
                if before != after {
                    doc.set_list_element(path, "tol", index, after)?;
                }
            }
        }
        (_, TolText::Scalar(token)) => doc.set_scalar(path, "tol", token)?,
        (_, TolText::List(elements)) => doc.set_scalar(path, "tol", &flow_list(elements))?,
        (_, TolText::Absent) => {}
    }
    Ok(true)
}

fn update_reference(
    doc: &mut PatchDocument,
    path: &[String],
    leaf: &Mapping,
    own_ref: Option<&'static str>,
    sets: &[EvaluatedMatch],
) -> Result<bool, HarnessError> {
    // only a reference key spelled on the leaf itself is rewritable
    let Some(ref_key) = own_ref else {
        return Ok(false);
    };
    let total = sets.len();
    let elementwise = total > 1 && matches!(leaf.get(ref_key), Some(Value::Sequence(_)));
    let mut modified = false;

    for set in sets {
        if set.success || set.params.flag("protected") {
            continue;
        }
        let Some(calculated) = set.calculated.as_deref() else {
            continue;
        };

        if elementwise {
            let template = doc
                .list_element_token(path, ref_key, set.index)
                .ok_or_else(|| locate_failure(path, ref_key))?;
            let reference = leaf
                .get(ref_key)
                .and_then(Value::as_sequence)
                .and_then(|seq| seq.get(set.index));
            let rendered = render_cast(calculated, reference, &template);
            if rendered != template {
                doc.set_list_element(path, ref_key, set.index, &rendered)?;
                modified = true;
            }
        } else {
            // a scalar reference is replaced whole; with several failed
            // sets the last one wins
            let template = doc
                .scalar_token(path, ref_key)
                .ok_or_else(|| locate_failure(path, ref_key))?;
            let rendered = render_cast(calculated, leaf.get(ref_key), &template);
            if rendered != template {
                doc.set_scalar(path, ref_key, &rendered)?;
                modified = true;
            }
        }
    }
    Ok(modified)
}

/// Render a calculated value in the type and shape of the token it
/// replaces.
fn render_cast(calculated: &str, reference: Option<&Value>, template: &str) -> String {
    match reference {
        Some(Value::Number(n)) if n.is_f64() => render_float(calculated, template),
        Some(Value::Number(_)) => match calculated.trim().parse::<i64>() {
            Ok(int) => int.to_string(),
            Err(_) => quote_if_needed(calculated),
        },
        Some(Value::Bool(_)) => render_bool(calculated, template),
        _ => quote_if_needed(calculated),
    }
}

fn render_float(calculated: &str, template: &str) -> String {
    match calculated.trim().parse::<f64>() {
        Ok(value) => format!("{:.*}", float_decimals(template), value),
        Err(_) => quote_if_needed(calculated),
    }
}

fn render_bool(calculated: &str, template: &str) -> String {
    let rendered = match calculated.trim().to_ascii_lowercase().as_str() {
        "true" => "true",
        "false" => "false",
        _ => return quote_if_needed(calculated),
    };
    if !template.chars().any(|ch| ch.is_ascii_lowercase()) {
        rendered.to_ascii_uppercase()
    } else if template.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        let mut chars = rendered.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => rendered.to_string(),
        }
    } else {
        rendered.to_string()
    }
}

/// Decimal places of a numeric token: the digits between the point and
/// the exponent marker (or the end).
fn float_decimals(template: &str) -> usize {
    match template.find('.') {
        Some(dot) => template[dot + 1..]
            .chars()
            .take_while(|ch| ch.is_ascii_digit())
            .count(),
        None => 0,
    }
}

/// Quote a replacement scalar when bare YAML would reinterpret it.
fn quote_if_needed(text: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let reinterpreted = text.is_empty()
        || text.trim() != text
        || text.parse::<f64>().is_ok()
        || matches!(
            lowered.as_str(),
            "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off"
        )
        || text.contains([
            ':', '#', '[', ']', '{', '}', ',', '\'', '"', '&', '*', '!', '|', '>', '%', '@',
        ]);
    if reinterpreted {
        format!("'{}'", text.replace('\'', "''"))
    } else {
        text.to_string()
    }
}

/// The leaf's current `tol` text in the document, element tokens kept
/// verbatim.
fn read_tolerance(doc: &PatchDocument, path: &[String]) -> TolText {
    match doc.scalar_token(path, "tol") {
        Some(token) if token.starts_with('[') => TolText::List(tol_elements(doc, path)),
        Some(token) => TolText::Scalar(token),
        None if doc.list_element_token(path, "tol", 0).is_some() => {
            TolText::List(tol_elements(doc, path))
        }
        None => TolText::Absent,
    }
}

fn tol_elements(doc: &PatchDocument, path: &[String]) -> Vec<String> {
    let mut elements = Vec::new();
    while let Some(token) = doc.list_element_token(path, "tol", elements.len()) {
        elements.push(token);
    }
    elements
}

/// Fill token for tolerance slots that stay at their current level: the
/// inherited tolerance if the set carries one, zero otherwise.
fn inherited_tol_token(params: &ParamSet) -> String {
    match params.get("tol") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => quote_if_needed(s),
        _ => "0".to_string(),
    }
}

fn flow_list(elements: &[String]) -> String {
    format!("[{}]", elements.join(", "))
}

/// The raw mapping of a leaf, reached by node names from the match root.
fn leaf_mapping<'a>(root: &'a Mapping, path: &[String]) -> Option<&'a Mapping> {
    let mut current = root;
    for name in path {
        let child = current.iter().find_map(|(key, value)| {
            let hit = match key.as_str() {
                Some(text) => text == name,
                None => scalar_to_string(key) == *name,
            };
            hit.then_some(value)
        })?;
        current = child.as_mapping()?;
    }
    Some(current)
}
