//! Send orchestration: render a template for a recipient, hand it to the
//! transport, and advance progress only once the transport has accepted it.

use std::sync::Arc;

use regex::Regex;
use referbot_core::traits::{MessageTransport, ProgressStore};
use referbot_core::{Clock, OutgoingMessage, RecipientProgress, ReferBotError, Result, Template};
use std::sync::LazyLock;

static LINK_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[referral_link\]|\{your_referral_link\}").expect("static regex")
});

/// Attach the recipient id to a referral link as `param=<id>`.
///
/// An existing `param=` is replaced in place; otherwise the pair is appended
/// with `?` or `&`. Empty links and ids are returned untouched.
pub fn link_with_recipient(link: &str, param: &str, recipient_id: &str) -> String {
    if link.is_empty() || recipient_id.is_empty() {
        return link.to_string();
    }
    let encoded = urlencoding::encode(recipient_id);
    if let Ok(existing) = Regex::new(&format!(r"(?i)([?&]){}=[^&#]*", regex::escape(param))) {
        if existing.is_match(link) {
            return existing
                .replace(link, |caps: &regex::Captures| format!("{}{param}={encoded}", &caps[1]))
                .into_owned();
        }
    }
    let separator = if link.contains('?') { '&' } else { '?' };
    format!("{link}{separator}{param}={encoded}")
}

/// Substitute every referral-link placeholder in `message`.
pub fn render_message(message: &str, progress: &RecipientProgress, param: &str) -> String {
    let link = link_with_recipient(&progress.referral_link, param, &progress.id);
    LINK_PLACEHOLDER
        .replace_all(message, regex::NoExpand(&link))
        .into_owned()
}

/// Renders, sends and records one template for one recipient.
pub struct Deliverer {
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    link_param: String,
}

impl Deliverer {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn ProgressStore>,
        clock: Arc<dyn Clock>,
        link_param: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            clock,
            link_param: link_param.into(),
        }
    }

    pub fn link_param(&self) -> &str {
        &self.link_param
    }

    /// Send `template` to the recipient.
    ///
    /// `Ok(false)` when the rendered text is blank (nothing sent, nothing
    /// advanced). A transport error leaves progress untouched so the same
    /// template is retried on the next evaluation.
    pub async fn deliver(&self, progress: &RecipientProgress, template: &Template) -> Result<bool> {
        let text = render_message(&template.message, progress, &self.link_param);
        if text.trim().is_empty() {
            tracing::debug!(
                "⏭️ Template #{} renders empty for {}, skipping",
                template.index,
                progress.id
            );
            return Ok(false);
        }

        self.transport
            .send(&progress.id, &OutgoingMessage::text(text))
            .await?;

        let next_step = template.index as u32 + 1;
        let sent_at = self.clock.now();
        match self.store.advance(&progress.id, next_step, sent_at).await {
            Ok(0) => {
                tracing::error!(
                    "🚨 RECONCILE: template #{} sent to {} via {} but no progress row was updated (step {} → {})",
                    template.index,
                    progress.id,
                    self.transport.name(),
                    progress.step,
                    next_step
                );
                Err(ReferBotError::ProgressWrite(format!(
                    "no record updated for {}",
                    progress.id
                )))
            }
            Ok(_) => {
                tracing::info!(
                    "📨 Sent template #{} to {} (step {} → {})",
                    template.index,
                    progress.id,
                    progress.step,
                    next_step
                );
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    "🚨 RECONCILE: template #{} sent to {} via {} but progress write failed: {e}",
                    template.index,
                    progress.id,
                    self.transport.name()
                );
                Err(ReferBotError::ProgressWrite(e.to_string()))
            }
        }
    }
}
