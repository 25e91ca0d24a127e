//! Error types for the hassAI domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator of the conversation loop has its own error enum.

use thiserror::Error;

/// The top-level error type for all hassAI operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion service errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool service errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

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
    ApiError { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The tool service could not be reached or refused the session.
    #[error("tool service unavailable: {0}")]
    Unavailable(String),

    /// The tool service answered with something we could not interpret.
    #[error("tool service protocol error: {0}")]
    Protocol(String),

    /// The tool ran and reported a failure. Displays the service's own explanation.
    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool service timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}
