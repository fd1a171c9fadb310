//! Error types for the congruence pipeline.

use std::path::PathBuf;

use congruence_core::{CurveError, CurveLabel};

/// Errors raised by the computational algebra backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("interpreter '{0}' not found")]
    NotFound(String),

    #[error("script not found at {0}")]
    ScriptNotFound(PathBuf),

    #[error("backend execution failed: {0}")]
    ExecutionFailed(String),

    #[error("failed to parse backend output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum CongruenceError {
    #[error("curve {0} is not in the database")]
    UnknownCurve(CurveLabel),

    #[error("no Fricke polynomial for p = {0} (supported: 2, 3, 5, 7, 13)")]
    UnsupportedPrime(u64),

    #[error("curve {curve} has no rational {p}-isogeny")]
    MissingIsogeny { curve: CurveLabel, p: u64 },

    #[error("star polynomial of {curve} has no irreducible factor of degree {p}")]
    MissingStarFactor { curve: CurveLabel, p: u64 },

    #[error("irreducible mod {p} groups contain pairs that are not congruent")]
    ConsistencyViolation {
        p: u64,
        pairs: Vec<(CurveLabel, CurveLabel)>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed pair list: {0}")]
    Report(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("curve error: {0}")]
    Curve(#[from] CurveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CongruenceError>;
