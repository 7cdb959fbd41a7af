use std::io;
use thiserror::Error;

/// Errors surfaced by the embedding providers and the [`Embedder`](crate::Embedder).
#[derive(Debug, Error)]
pub enum SemanticError {
    /// The ONNX model could not be located locally and no download URL was provided.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The tokenizer JSON is missing and there was no remote URL to fetch it from.
    #[error("tokenizer missing: {0}")]
    TokenizerMissing(String),
    /// Configuration is inconsistent (e.g. hosted mode without an API key).
    #[error("invalid semantic config: {0}")]
    InvalidConfig(String),
    /// Network failure or non-success status while talking to a remote endpoint.
    #[error("download failed: {0}")]
    Download(String),
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// ONNX Runtime, tokenizer, or response-parsing errors.
    #[error("inference failure: {0}")]
    Inference(String),
    /// A provider returned a vector of the wrong length for its model.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Every configured provider failed for the same input.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
}

impl Clone for SemanticError {
    fn clone(&self) -> Self {
        match self {
            SemanticError::ModelNotFound(s) => SemanticError::ModelNotFound(s.clone()),
            SemanticError::TokenizerMissing(s) => SemanticError::TokenizerMissing(s.clone()),
            SemanticError::InvalidConfig(s) => SemanticError::InvalidConfig(s.clone()),
            SemanticError::Download(s) => SemanticError::Download(s.clone()),
            SemanticError::Io(err) => SemanticError::Inference(format!("io error: {err}")),
            SemanticError::Inference(s) => SemanticError::Inference(s.clone()),
            SemanticError::DimensionMismatch { expected, actual } => {
                SemanticError::DimensionMismatch {
                    expected: *expected,
                    actual: *actual,
                }
            }
            SemanticError::EmbeddingUnavailable(s) => {
                SemanticError::EmbeddingUnavailable(s.clone())
            }
        }
    }
}
