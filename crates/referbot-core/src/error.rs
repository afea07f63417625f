//! Error types shared across all ReferBot crates.

use thiserror::Error;

/// Top-level error for the referral bot.
#[derive(Debug, Error)]
pub enum ReferBotError {
    /// The template source could not be reached or returned garbage.
    #[error("Template source unavailable: {0}")]
    SourceUnavailable(String),

    /// The outbound message transport rejected or failed a send.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message was delivered but the progress update did not land.
    #[error("Progress write failed: {0}")]
    ProgressWrite(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReferBotError {
    /// Whether the failure happened after the recipient was already messaged.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, ReferBotError::ProgressWrite(_))
    }
}

pub type Result<T> = std::result::Result<T, ReferBotError>;
