//! Data model shared by the scheduler, persistence and transport crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in one hour.
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// One step of the drip sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Display-only order column from the sheet. Never used for sorting.
    pub order: i64,
    /// Delay after the previous send (or account creation), in hours.
    pub delay_hours: f64,
    /// Message body, may contain referral link placeholders.
    pub message: String,
    /// Position in the retained list; the `step` that triggers this template.
    pub index: usize,
    /// `delay_hours` converted to milliseconds.
    pub delay_ms: i64,
}

impl Template {
    pub fn new(order: i64, delay_hours: f64, message: impl Into<String>, index: usize) -> Self {
        Self {
            order,
            delay_hours,
            message: message.into(),
            index,
            delay_ms: clamp_delay_ms(delay_hours * MS_PER_HOUR),
        }
    }

    pub fn delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.delay_ms)
    }
}

/// Round to whole milliseconds, clamped to what `chrono::Duration` can hold.
fn clamp_delay_ms(ms: f64) -> i64 {
    let max = chrono::Duration::MAX.num_milliseconds();
    if ms.is_nan() {
        return 0;
    }
    (ms.round().clamp(-max as f64, max as f64) as i64).clamp(-max, max)
}

/// A recipient's position in the drip sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientProgress {
    /// Page-scoped user id of the recipient.
    pub id: String,
    pub referral_link: String,
    /// Index of the next template to send.
    pub step: u32,
    pub last_message_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RecipientProgress {
    pub fn new(id: impl Into<String>, referral_link: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            referral_link: referral_link.into(),
            step: 0,
            last_message_sent_at: None,
            created_at,
        }
    }

    /// Anchor for the next due time: last send, else account creation.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.last_message_sent_at.unwrap_or(self.created_at)
    }
}

/// Payload handed to the message transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
