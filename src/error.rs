//! Error types for Barista.

use thiserror::Error;

/// Library-level error type for Barista operations.
#[derive(Error, Debug)]
pub enum BaristaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool registry error: {0}")]
    Registry(String),

    #[error("Language model error: {0}")]
    Model(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Outlet database error: {0}")]
    OutletStore(String),

    #[error("Rejected SQL query: {0}")]
    UnsafeSql(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Barista operations.
pub type Result<T> = std::result::Result<T, BaristaError>;
