//! Error types for the tuner and its runtime collaborators.

/// Failure reported by a runtime collaborator.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Memory statistics unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the tuner.
///
/// Bad tuning input is never an error: it is corrected during validation.
#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    #[error("Runtime memory oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    #[error("start() must be called from within a Tokio runtime")]
    NoAsyncRuntime,
}
