//! Calculated-versus-reference comparison.
//!
//! Two values compare numerically when both parse as floats; otherwise
//! they compare as strings. Numeric comparison is exact unless a non-zero
//! tolerance is given. Failures carry enough detail for the display layer
//! to print a diagnostic block; this module itself never prints.

use crate::params::scalar_to_string;
use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;
use tracing::warn;

/// References smaller than this in magnitude get no relative-deviation
/// figure; the division would dominate the display with noise.
const DEVIATION_FLOOR: f64 = 1e-10;

/// The outcome of one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub success: bool,
    /// Diagnostic detail, present exactly when the comparison failed.
    pub mismatch: Option<Mismatch>,
}

/// Detail behind a failed comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Numeric {
        calculated: f64,
        reference: f64,
        difference: f64,
        /// Percent deviation from the reference, when the reference is
        /// large enough to divide by.
        deviation_pct: Option<f64>,
        tolerance: Option<f64>,
        tolerance_pct: Option<f64>,
    },
    Text {
        calculated: String,
        expected: String,
    },
}

/// Whether `value` reads as a float, including `inf`/`-inf`/`nan` forms.
pub fn is_number(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

/// Compare an extracted value against its declared reference.
///
/// `tolerance` is the effective tolerance; callers pass `None` for
/// absent-or-zero. A tolerance tighter than the precision implied by the
/// calculated value's own formatting is almost certainly a mistake and
/// is flagged with a warning.
pub fn compare(calculated: &str, reference: &Value, tolerance: Option<f64>) -> Comparison {
    let reference_text = scalar_to_string(reference);
    let numeric = calculated
        .trim()
        .parse::<f64>()
        .ok()
        .zip(reference_text.trim().parse::<f64>().ok());

    let Some((calc, refv)) = numeric else {
        let success = calculated == reference_text;
        return Comparison {
            success,
            mismatch: (!success).then(|| Mismatch::Text {
                calculated: calculated.to_string(),
                expected: reference_text,
            }),
        };
    };

    if let Some(tol) = tolerance {
        let precision = precision_of(calculated);
        if tol > 0.0 && tol < precision {
            warn!(
                "Tolerance {tol} is smaller than the effective precision {precision} of \
                 calculated value '{calculated}'. Consider using tolerance >= {precision:.2e}"
            );
        }
    }

    let difference = (calc - refv).abs();
    let success = match tolerance {
        Some(tol) => difference <= tol,
        None => difference == 0.0,
    };
    let relative = (refv.abs() > DEVIATION_FLOOR).then(|| 100.0 / refv.abs());
    Comparison {
        success,
        mismatch: (!success).then(|| Mismatch::Numeric {
            calculated: calc,
            reference: refv,
            difference,
            deviation_pct: relative.map(|scale| difference * scale),
            tolerance,
            tolerance_pct: tolerance.and_then(|tol| relative.map(|scale| tol * scale)),
        }),
    }
}

/// The smallest increment representable in the formatting of a numeric
/// literal: `"1.23"` resolves to 0.01, `"1.23e-2"` to 1e-4, `"42"` to 1.
/// Anything that does not parse as a float resolves to 0.
pub fn precision_of(value: &str) -> f64 {
    if value.trim().parse::<f64>().is_err() {
        return 0.0;
    }
    // Fortran exponent markers read as scientific notation.
    let cleaned = value.trim().replace(['d', 'D'], "e");

    if let Some(caps) = sci_notation_re().captures(&cleaned) {
        let exponent: i32 = caps[2].parse().unwrap_or(0);
        return mantissa_precision(&caps[1]) * 10f64.powi(exponent);
    }
    mantissa_precision(&cleaned)
}

fn mantissa_precision(mantissa: &str) -> f64 {
    match mantissa.split_once('.') {
        Some((_, decimals)) => 10f64.powi(-(decimals.len() as i32)),
        None => 1.0,
    }
}

fn sci_notation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d*\.?\d*)[eE]([+-]?\d+)$").expect("scientific-notation regex must compile")
    })
}
