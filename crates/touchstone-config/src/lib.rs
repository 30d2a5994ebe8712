//! # Touchstone Config
//!
//! Test specification documents: loading and scope resolution on the way
//! in, and formatting-preserving auto-update on the way out.
//!
//! A specification is consumed twice. Evaluation reads the parsed YAML
//! value tree; auto-update rewrites individual scalar tokens of the
//! original text so that every byte the update did not touch survives
//! verbatim, comments and quoting included.

pub mod loader;
pub mod patch;
pub mod update;

pub use loader::{InputScope, TestConfig};
pub use patch::PatchDocument;
pub use update::{UpdateMode, apply_updates, compute_tolerance};
