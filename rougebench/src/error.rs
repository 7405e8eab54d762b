//! Error types for the evaluation pipeline.
//!
//! Every variant is fatal to a run. The only recoverable case is a
//! generation failure under [`FailurePolicy::Skip`](crate::generate::FailurePolicy),
//! which never surfaces as an `EvalError` at all.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// Input path does not resolve to a readable file
    #[error("File not found: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input is not a JSON array of objects
    #[error("Invalid JSON format: {0}")]
    Format(String),

    /// A record is missing a required field
    #[error("Record {index}: {reason}")]
    Schema { index: usize, reason: String },

    /// The generation backend failed for a record
    #[error("Generation failed for record {index}: {message}")]
    Generation { index: usize, message: String },

    /// Nothing left to aggregate
    #[error("Cannot aggregate scores over an empty batch")]
    EmptyBatch,

    #[error("Got {candidates} candidates but {references} references")]
    LengthMismatch {
        candidates: usize,
        references: usize,
    },

    /// Backend, vocabulary or sampling misconfiguration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type EvalResult<T> = Result<T, EvalError>;
