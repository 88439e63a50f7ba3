//! Error types for the subject-isolated RAG core.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    InvalidChunkOverlap { size: usize, overlap: usize },

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors raised by a tokenizer adapter.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load tokenizer from {path}: {reason}")]
    LoadError { path: PathBuf, reason: String },

    #[error("tokenization failed: {0}")]
    EncodeError(String),
}

/// Errors related to document chunking.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("cannot embed empty input")]
    EmptyInput,

    #[error("embedding model error: {0}")]
    ModelError(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => {
                let msg = msg.to_lowercase();
                ["502", "503", "504", "429", "unavailable", "too many requests"]
                    .iter()
                    .any(|needle| msg.contains(needle))
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::EmptyInput
            | EmbeddingError::ModelError(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid subject name: {0:?}")]
    InvalidSubject(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("incomplete persisted state for subject {subject}: found {present} but not {missing}")]
    IncompletePersistence {
        subject: String,
        present: PathBuf,
        missing: PathBuf,
    },

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("store lock poisoned for subject {0}")]
    LockPoisoned(String),
}

impl VectorStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VectorStoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VectorStoreError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors related to retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors reported by a generation provider.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider error: {0}")]
    Provider(String),

    #[error("generation request rejected: {0}")]
    InvalidRequest(String),
}

/// Errors related to loading source documents.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("directory walk error: {0}")]
    WalkError(String),

    #[error("invalid exclude pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ConnectionError("refused".into()).is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".into()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 400: bad".into()).is_retryable());
        assert!(!EmbeddingError::EmptyInput.is_retryable());
    }

    #[test]
    fn test_overlap_error_message() {
        let err = ConfigError::InvalidChunkOverlap {
            size: 100,
            overlap: 100,
        };
        assert_eq!(
            err.to_string(),
            "chunk_overlap (100) must be smaller than chunk_size (100)"
        );
    }
}
