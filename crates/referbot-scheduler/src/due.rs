//! Due-time evaluation. Pure: no I/O, no clock reads.

use chrono::{DateTime, Utc};
use referbot_core::{RecipientProgress, Template};

/// Outcome of evaluating one recipient against the template list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DueState<'a> {
    /// The template at `progress.step` should be sent now.
    Due(&'a Template),
    /// Next template exists but its delay has not elapsed.
    Waiting { due_at: DateTime<Utc> },
    /// Every template has been sent (or there are none).
    Exhausted,
}

/// Where a recipient stands right now.
pub fn evaluate<'a>(
    progress: &RecipientProgress,
    templates: &'a [Template],
    now: DateTime<Utc>,
) -> DueState<'a> {
    let Some(template) = templates.get(progress.step as usize) else {
        return DueState::Exhausted;
    };
    // Out-of-range delays from the sheet must not panic the sweep.
    let due_at = match progress.reference_time().checked_add_signed(template.delay()) {
        Some(at) => at,
        None if template.delay_ms < 0 => return DueState::Due(template),
        None => return DueState::Waiting { due_at: DateTime::<Utc>::MAX_UTC },
    };
    if now >= due_at {
        DueState::Due(template)
    } else {
        DueState::Waiting { due_at }
    }
}

/// The template to send now, if any.
pub fn next_due<'a>(
    progress: &RecipientProgress,
    templates: &'a [Template],
    now: DateTime<Utc>,
) -> Option<&'a Template> {
    match evaluate(progress, templates, now) {
        DueState::Due(template) => Some(template),
        _ => None,
    }
}
