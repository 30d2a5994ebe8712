//! # Touchstone Kernel
//!
//! The match evaluation engine: a declarative, recursively nested
//! specification of expected values is resolved against the files a
//! program actually wrote.
//!
//! This crate is **orchestration-agnostic**: it never runs executables,
//! prints status lines, or writes reports. It only prescribes how a match
//! specification resolves through scope inheritance, broadcasting, value
//! extraction, and comparison.
//!
//! ## Architecture
//!
//! ```text
//! ParamSet            ← resolved reserved-key scope for one match
//!     │
//! Broadcast           ← aligned list values expand to N parameter sets
//!     │
//! Matcher registry    ← directory / file-size / file-content handlers
//!     │
//! Extractor           ← line, field, column, pattern + offset
//!     │
//! Comparator          ← numeric tolerance or string identity
//!     │
//! Tree walk           ← groups, leaves, evaluated result tree
//! ```

pub mod compare;
pub mod error;
pub mod extract;
pub mod matchers;
pub mod params;
pub mod walk;

pub use compare::{Comparison, Mismatch, compare, is_number, precision_of};
pub use error::{HarnessError, exit};
pub use matchers::{MatchEval, evaluate_match};
pub use params::{
    INTERNAL_KEYS, NON_UPDATABLE_KEYS, ParamSet, REFERENCE_KEYS, RESERVED_KEYS, broadcast,
    cast_like, is_truthy, scalar_to_string,
};
pub use walk::{EvaluatedMatch, MatchNode, WalkOutcome, walk_matches};
