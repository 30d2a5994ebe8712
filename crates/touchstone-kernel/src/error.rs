//! Error types for Touchstone harness operations.

/// Process exit codes for each class of harness outcome.
pub mod exit {
    /// All executions and matches passed.
    pub const OK: i32 = 0;
    /// At least one execution or match failed.
    pub const TEST_FAILURE: i32 = 1;
    /// Command line or match parameters were malformed.
    pub const USAGE: i32 = 2;
    /// The test specification was missing or unreadable.
    pub const CONFIG: i32 = 3;
    /// The executable or its input files could not be prepared.
    pub const RUNTIME: i32 = 4;
    /// A harness-level operation exceeded its time budget.
    pub const TIMEOUT: i32 = 5;
    /// An unexpected failure inside the harness itself.
    pub const INTERNAL: i32 = 99;
}

/// Errors that abort a harness run.
///
/// Failures of the test under inspection (a non-zero exit from the
/// executable, a mismatched value) are ordinary results, not errors;
/// this enum covers only conditions where the harness cannot proceed.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Match parameters or command usage were malformed.
    #[error("{0}")]
    Usage(String),

    /// The test specification could not be loaded.
    #[error("{0}")]
    Config(String),

    /// The executable or its input files could not be prepared.
    #[error("{0}")]
    Runtime(String),

    /// A harness operation timed out.
    #[error("{0}")]
    Timeout(String),
}

impl HarnessError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Usage(_) => exit::USAGE,
            HarnessError::Config(_) => exit::CONFIG,
            HarnessError::Runtime(_) => exit::RUNTIME,
            HarnessError::Timeout(_) => exit::TIMEOUT,
        }
    }
}
