use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// LLM backend errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Backend unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Search provider errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("API key not configured for {provider}")]
    MissingApiKey { provider: String },

    #[error("{provider} API error: status {status}")]
    Api { provider: String, status: u16 },

    #[error("Invalid {provider} response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Stdio protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for ProtocolError {
    fn from(err: AppError) -> Self {
        ProtocolError::InvalidRequest {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for LLM backend operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for search provider calls
pub type ProviderResult<T> = Result<T, SearchError>;

/// Result type alias for protocol handling
pub type ProtocolResult<T> = Result<T, ProtocolError>;
