//! Custom error types for schemadex

use thiserror::Error;

/// Main error type for schemadex operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Malformed extractor output: {0}")]
    MalformedInput(String),

    #[error("Description generation failed: {0}")]
    Generation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("No SQL query generated")]
    EmptySynthesis,

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

    #[error("Database not found: {0}")]
    DatabaseNotFound(i64),

    #[error("Table not found: {0}")]
    TableNotFound(i64),

    #[error("Not initialized: run 'schemadex init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a lookup miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DatabaseNotFound(_) | Error::TableNotFound(_))
    }
}

/// Result type alias for schemadex
pub type Result<T> = std::result::Result<T, Error>;
