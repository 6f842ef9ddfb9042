//! Error types for the tfmdp crate

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the tfmdp crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown domain '{id}' (expected a registry id such as {expected}, or an instance file)")]
    UnknownDomain { id: String, expected: String },

    #[error("failed to read instance file '{}': {source}", path.display())]
    InstanceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid instance file '{}': {source}", path.display())]
    InstanceFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid domain parameters: {message}")]
    InvalidDomain { message: String },

    #[error("the hybrid estimator needs a block length (--n-step)")]
    MissingNStep,

    #[error("planner has not been built, call build() before run()")]
    NotBuilt,

    #[error("horizon must be at least one timestep")]
    ZeroHorizon,

    #[error("batch size must be at least one trajectory")]
    ZeroBatchSize,

    #[error("no reward was recorded during training")]
    EmptyRewards,

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {operation} checkpoint '{}': {message}", path.display())]
    Checkpoint {
        operation: String,
        path: PathBuf,
        message: String,
    },

    #[error("failed to read tensor data: {message}")]
    TensorData { message: String },

    #[error("progress bar template error: {message}")]
    ProgressBarTemplate { message: String },
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            operation: operation.into(),
            source,
        }
    }
}
