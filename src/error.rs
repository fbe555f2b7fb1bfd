//! Custom error types for profitiq

use thiserror::Error;

/// Main error type for profitiq operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Caller is not the owning contractor. Deliberately opaque: the message
    /// never reveals whether the resource exists under another owner.
    #[error("Project not found or access denied")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid ingest token")]
    InvalidIngestToken,

    #[error("Failed to fetch document content: {0}")]
    BlobFetch(String),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Model invocation failed: {0}")]
    Model(String),

    #[error("Failed to parse extraction result: {0}")]
    ExtractionParse(String),

    #[error("Not initialized: run 'profitiq init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for profitiq
pub type Result<T> = std::result::Result<T, Error>;
