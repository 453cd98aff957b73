// External imports
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the regressors and their collaborators.
///
/// There are no retries anywhere in the crate: every failure propagates
/// straight to the caller. An interrupted epoch leaves parameters at the
/// last applied gradient step; checkpoints from completed epochs are
/// unaffected.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Raised at construction for optimizer identifiers other than
    /// "adam" and "gd".
    #[error("optimizer `{0}` is not supported")]
    UnsupportedOptimizer(String),

    /// Raised at construction for recurrent cell families other than
    /// "gru" and "lstm".
    #[error("unknown rnn_type `{0}`")]
    UnsupportedRnnType(String),

    /// Raised the first time the loss function is invoked with an
    /// unrecognized loss identifier.
    #[error("unknown loss `{0}`")]
    UnknownLoss(String),

    /// Raised the first time the metric function is invoked with an
    /// unrecognized metric identifier.
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    /// A required dataset split was missing or empty at fit entry.
    #[error("empty {0} data from dataset, please check your dataset config")]
    EmptySplit(&'static str),

    /// `predict` was called before a successful fit or checkpoint load.
    #[error("model is not fitted yet")]
    NotFitted,

    /// Malformed collaborator output: shape mismatches, missing columns,
    /// unknown segments.
    #[error("dataset error: {0}")]
    Data(String),

    #[error(transparent)]
    Frame(#[from] polars::error::PolarsError),

    /// Parameter persistence failed.
    #[error("checkpoint failed at {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
