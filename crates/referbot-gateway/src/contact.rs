//! What happens when someone messages the Page.
//!
//! A new sender gets a referral record and the first template right away.
//! If no template goes out (no sheet, nothing due yet, or the send failed)
//! they get a plain message carrying their link instead.

use rand::Rng;
use referbot_core::{OutgoingMessage, ReferBotError, Result};
use referbot_scheduler::link_with_recipient;

use crate::server::AppState;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 8;

const APOLOGY: &str =
    "Sorry, there was an error generating your referral link. Please try again later.";

/// Random 8-character referral code from `[A-Z0-9]`.
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

fn fallback_text(link: &str) -> String {
    format!("Here is your unique referral link: {link}\n\nShare this link with friends to earn rewards!")
}

/// Handle an inbound message from `psid`. Never fails: errors are logged and
/// the sender gets an apology (best effort).
pub async fn handle_first_contact(state: &AppState, psid: &str) {
    if let Err(e) = first_contact(state, psid).await {
        tracing::error!("❌ Error handling referral message from {psid}: {e}");
        let apology = OutgoingMessage::text(APOLOGY);
        if let Err(e) = state.transport.send(psid, &apology).await {
            tracing::warn!("⚠️ Could not send apology to {psid}: {e}");
        }
    }
}

async fn first_contact(state: &AppState, psid: &str) -> Result<()> {
    let referral = match state.db.get_by_psid(psid)? {
        Some(existing) => {
            tracing::info!("👤 Existing referral found for {psid}");
            existing
        }
        None => {
            let link = format!("{}{}", state.config.referral.base_url, generate_referral_code());
            state.db.save_referral(psid, &link, state.clock.now())?;
            tracing::info!("🆕 New referral created for {psid}");
            state
                .db
                .get_by_psid(psid)?
                .ok_or_else(|| ReferBotError::NotFound(format!("referral for {psid}")))?
        }
    };

    if let Some(engine) = &state.engine {
        if engine.send_first_touch(&referral).await {
            return Ok(());
        }
    }

    // Same lock the sweeper takes, so the fallback never interleaves with a
    // template send for this recipient.
    let _guard = match &state.engine {
        Some(engine) => Some(engine.lock_recipient(psid).await),
        None => None,
    };
    let current = state
        .db
        .get_by_psid(psid)?
        .ok_or_else(|| ReferBotError::NotFound(format!("referral for {psid}")))?;

    let link = link_with_recipient(&current.referral_link, &state.config.scheduler.link_param, psid);
    state
        .transport
        .send(psid, &OutgoingMessage::text(fallback_text(&link)))
        .await?;

    let next_step = current.step + 1;
    if state.db.advance(psid, next_step, state.clock.now())? == 0 {
        tracing::warn!("⚠️ Fallback link sent to {psid} but step {next_step} was not recorded");
    }
    Ok(())
}
