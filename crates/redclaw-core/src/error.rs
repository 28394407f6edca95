//! RedClaw error type.

use thiserror::Error;

/// Convenience alias used across all RedClaw crates.
pub type Result<T> = std::result::Result<T, RedClawError>;

/// All errors the platform can produce.
#[derive(Debug, Error)]
pub enum RedClawError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RAG store error: {0}")]
    Rag(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("VPN error: {0}")]
    Vpn(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),
}
