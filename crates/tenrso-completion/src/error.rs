//! Error types for tensor completion

use scirs2_linalg::LinalgError;
use std::path::PathBuf;
use tenrso_sparse::SparseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("unknown completion algorithm '{0}' (expected one of gd, cg, nlcg, lbfgs, sgd, ccd, als)")]
    UnknownAlgorithm(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Sparse(#[from] SparseError),

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("failed to write '{}': {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to print the run report: {0}")]
    Report(#[source] std::io::Error),

    #[error("another participant failed")]
    PeerFailed,

    #[error("participant {rank} panicked")]
    ParticipantPanicked { rank: usize },
}

pub type CompletionResult<T> = Result<T, CompletionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CompletionError::UnknownAlgorithm("xgd".to_string());
        assert!(err.to_string().contains("'xgd'"));

        let err: CompletionError = SparseError::InvalidPartition("gap".to_string()).into();
        assert!(matches!(err, CompletionError::Sparse(_)));
    }
}
