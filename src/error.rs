use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Reasons a training run can fail. `train` never lets these escape: every
/// variant ends in the placeholder metrics.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("too few samples to train: {0}")]
    TooFewSamples(usize),

    #[error("training split contains a single class")]
    SingleClass,

    #[error("labels must be 0 or 1, found {0}")]
    NonBinaryLabel(f64),

    #[error("feature matrix contains a non-finite value at row {row}")]
    NonFinite { row: usize },

    #[error("failed to persist model: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt artifact at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported artifact at {path}: format {format:?} version {version}")]
    UnsupportedFormat {
        path: PathBuf,
        format: String,
        version: u32,
    },

    #[error("classifier expects {classifier} features but scaler has {scaler}")]
    FeatureCountMismatch { classifier: usize, scaler: usize },

    #[error("classifier fit {classifier} does not match scaler fit {scaler}")]
    MismatchedPair { classifier: Uuid, scaler: Uuid },

    #[error("failed to serialize artifact: {0}")]
    Serialize(#[source] serde_json::Error),
}
