//! Collaborator interfaces consumed by the follow-up scheduler.
//!
//! Each trait is implemented once for production (sheets, SQLite, Messenger)
//! and once as an in-memory fake in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{OutgoingMessage, RecipientProgress};

/// Tabular source of message templates. Row 0 is the header.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>>;
}

/// Read/write access to each recipient's drip progress.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Every recipient, in the store's natural order.
    async fn list_all(&self) -> Result<Vec<RecipientProgress>>;

    async fn find(&self, id: &str) -> Result<Option<RecipientProgress>>;

    /// Set `step = next_step` and `last_message_sent_at = sent_at`.
    /// Returns the number of affected records.
    async fn advance(&self, id: &str, next_step: u32, sent_at: DateTime<Utc>) -> Result<usize>;
}

/// Outbound chat transport.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, recipient_id: &str, message: &OutgoingMessage) -> Result<()>;
}
