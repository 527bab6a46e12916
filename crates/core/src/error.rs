//! Error types for the Recap domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Recap operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Summary tree errors ---
    #[error("Summary tree error: {0}")]
    Tree(#[from] TreeError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying against the same backend.
    ///
    /// Rate limits, timeouts, dropped connections and server-side (5xx)
    /// failures are transient. Authentication, missing models and client
    /// errors will fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }

    /// Minimum wait the backend asked for before the next attempt, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(std::time::Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Document is empty: nothing to summarize")]
    EmptyInput,

    #[error("Invalid chunk size {0}: must be greater than zero")]
    InvalidChunkSize(usize),

    #[error("Invalid group size {0}: reduction needs groups of at least two")]
    InvalidGroupSize(usize),

    #[error("Position {position} not covered by summary tree [{start}, {end}]")]
    PositionOutOfRange {
        position: usize,
        start: usize,
        end: usize,
    },

    #[error("Invalid reading progress {0}: expected a value in [0, 1]")]
    InvalidProgress(f64),

    #[error("Unknown node id: {0}")]
    UnknownNode(usize),

    #[error("Structural invariant violated: {0}")]
    StructuralViolation(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Summarizer failed for {stage}: {source}")]
    Backend {
        stage: String,
        #[source]
        source: ProviderError,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),
}
