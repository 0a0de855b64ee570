//! Unified error types for sparse tensor storage and I/O
//!
//! All fallible operations in this crate return [`SparseResult`]. Errors are
//! grouped by where they originate:
//!
//! - **I/O**: a source could not be opened or read (`Io`)
//! - **Parsing**: a data line of a tensor file is not well formed (`Parse`,
//!   `Malformed`, `TooManyModes`)
//! - **Consistency**: the two reader passes disagree (`Inconsistent`)
//! - **Validation**: tensor construction or partitioning received bad input
//!
//! # Examples
//!
//! ```
//! use tenrso_sparse::error::SparseError;
//!
//! let err = SparseError::TooManyModes { found: 9, max: 8 };
//! assert_eq!(
//!     err.to_string(),
//!     "maximum 8 modes supported, found 9"
//! );
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sparse tensor operations
#[derive(Error, Debug)]
pub enum SparseError {
    /// A source could not be opened or read
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A data line could not be parsed
    #[error("{source_name}:{line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// The first data line does not describe a tensor
    #[error("{source_name}: malformed tensor ({reason})")]
    Malformed { source_name: String, reason: String },

    /// Mode count above [`crate::MAX_NMODES`]
    #[error("maximum {max} modes supported, found {found}")]
    TooManyModes { found: usize, max: usize },

    /// Shape pass and fill pass disagree
    #[error("{source_name}: shape pass counted {expected} entries but fill pass read {got}")]
    Inconsistent {
        source_name: String,
        expected: usize,
        got: usize,
    },

    /// Validation errors (shape, indices, values)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Index outside the tensor extent
    #[error("Index out of bounds: index {index:?} exceeds shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    /// Ownership partition errors
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),
}

/// Validation errors for tensor properties
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Shape cannot be empty")]
    EmptyShape,

    #[error("Shape dimensions must match: expected {expected}, got {got}")]
    ShapeDimsMismatch { expected: usize, got: usize },

    #[error("Indices and values must have same length: {indices} indices vs {values} values")]
    LengthMismatch { indices: usize, values: usize },
}

/// Result type alias for sparse tensor operations
pub type SparseResult<T> = Result<T, SparseError>;

impl SparseError {
    /// Create a parse error for a 1-based line of a named source
    pub fn parse(source_name: &str, line: usize, reason: impl Into<String>) -> Self {
        SparseError::Parse {
            source_name: source_name.to_string(),
            line,
            reason: reason.into(),
        }
    }

    /// Create an index out of bounds error
    pub fn index_out_of_bounds(index: Vec<usize>, shape: Vec<usize>) -> Self {
        SparseError::IndexOutOfBounds { index, shape }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = ValidationError::EmptyShape;
        assert_eq!(err.to_string(), "Shape cannot be empty");
    }

    #[test]
    fn test_parse_error_mentions_line() {
        let err = SparseError::parse("train.tns", 7, "expected 4 tokens, found 3");
        assert_eq!(err.to_string(), "train.tns:7: expected 4 tokens, found 3");
    }

    #[test]
    fn test_sparse_error_from_validation() {
        let err: SparseError = ValidationError::LengthMismatch {
            indices: 2,
            values: 3,
        }
        .into();
        assert!(matches!(err, SparseError::Validation(_)));
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = SparseError::Io {
            path: PathBuf::from("missing.tns"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("missing.tns"));
    }
}
