//! Error types for embedding generation and the similarity index.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by embedding providers, matrix persistence and search.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding backend cannot be loaded or run.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Input text could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Reading or writing the matrix artifact failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact does not describe a rectangular float matrix.
    #[error("invalid embedding artifact {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// A vector does not match the matrix dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Rows were offered to a matrix whose vectors have no components.
    #[error("zero-length vectors cannot be indexed")]
    ZeroDimension,

    /// Vectors from different models were combined.
    #[error("model mismatch: matrix built with {found}, provider is {expected}")]
    ModelMismatch { expected: String, found: String },
}

impl EmbeddingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        Self::ModelUnavailable(err.to_string())
    }
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;
