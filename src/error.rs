//! Error types for PDF chat operations.
//!
//! The variants follow the failure classes a user can hit while processing
//! documents or asking questions: bad input, missing credentials, failing
//! remote services, and asking before anything has been processed.

use thiserror::Error;

/// Errors produced by the extraction, indexing, and conversation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// An uploaded file could not be read as a PDF.
    #[error("failed to extract text from '{file}': {message}")]
    Extract {
        /// Name of the offending upload.
        file: String,
        /// Reason reported by the PDF parser.
        message: String,
    },

    /// Processing was requested but produced nothing to index.
    #[error("no documents to process: {0}")]
    NoDocuments(String),

    /// The API key environment variable for a hosted model is not set.
    #[error("{var} environment variable not set")]
    MissingCredential {
        /// Name of the environment variable that was checked.
        var: String,
    },

    /// A hosted embedding or chat API returned an error or was unreachable.
    #[error("{provider} API error: {message}")]
    Remote {
        /// Provider name (`gemini`, `openai`).
        provider: String,
        /// Status line or transport error.
        message: String,
    },

    /// A hosted API answered with a payload we could not interpret.
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse {
        /// Provider name (`gemini`, `openai`).
        provider: String,
        /// What was wrong with the payload.
        message: String,
    },

    /// A question was asked before any documents were processed.
    #[error("no documents have been processed yet; upload PDFs and click Process first")]
    NotProcessed,

    /// The requested index collection does not exist on disk.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The persisted index could not be read or written.
    #[error("index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds a [`Error::Remote`] for `provider` from any displayable cause.
    pub fn remote(provider: &str, message: impl std::fmt::Display) -> Self {
        Error::Remote {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds a [`Error::InvalidResponse`] for `provider`.
    pub fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        Error::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
