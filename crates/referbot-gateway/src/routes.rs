//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use referbot_core::OutgoingMessage;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::server::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "referbot-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "scheduler": state.engine.is_some(),
    }))
}

/// Messenger webhook verification (GET) — Meta sends a challenge.
pub async fn webhook_verify(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let (Some(mode), Some(token)) = (params.get("hub.mode"), params.get("hub.verify_token")) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == "subscribe" && *token == state.config.messenger.verify_token {
        tracing::info!("✅ Messenger webhook verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        tracing::warn!("⚠️ Messenger webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Messenger webhook handler (POST) — one event per entry, processed in the
/// background so Meta gets its 200 quickly.
pub async fn webhook_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if body["object"].as_str() != Some("page") {
        return StatusCode::NOT_FOUND.into_response();
    }

    for entry in body["entry"].as_array().into_iter().flatten() {
        let event = &entry["messaging"][0];
        let Some(psid) = event["sender"]["id"].as_str() else {
            continue;
        };
        if event.get("message").is_none() {
            continue;
        }

        tracing::info!("[messenger] Message from {psid}");
        let state = state.clone();
        let psid = psid.to_string();
        tokio::spawn(async move {
            super::contact::handle_first_contact(&state, &psid).await;
        });
    }

    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}

/// All referrals, newest first.
pub async fn list_referrals(State(state): State<Arc<AppState>>) -> Response {
    match state.db.list_all() {
        Ok(referrals) => {
            let rows: Vec<serde_json::Value> = referrals
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "psid": r.id,
                        "referral_link": r.referral_link,
                        "message_step": r.step,
                        "last_message_sent_at": r.last_message_sent_at.map(|t| t.to_rfc3339()),
                        "created_at": r.created_at.to_rfc3339(),
                    })
                })
                .collect();
            Json(rows).into_response()
        }
        Err(e) => {
            tracing::error!("❌ Error reading referrals: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to read referrals"})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RewardRequest {
    #[serde(default)]
    pub psid: String,
    #[serde(default)]
    pub referral_link: String,
    pub reward_message: Option<String>,
}

/// Send a reward message to a referrer.
pub async fn send_reward(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RewardRequest>,
) -> Response {
    if req.psid.is_empty() || req.referral_link.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "PSID and referral link are required"})),
        )
            .into_response();
    }

    let text = req.reward_message.filter(|m| !m.is_empty()).unwrap_or_else(|| {
        format!(
            "🎉 Congratulations! You've earned a reward for sharing your referral link: {}\n\nThank you for helping us grow!",
            req.referral_link
        )
    });

    match state.transport.send(&req.psid, &OutgoingMessage::text(text)).await {
        Ok(()) => {
            tracing::info!("🎁 Reward sent to {} ({})", req.psid, req.referral_link);
            Json(serde_json::json!({
                "success": true,
                "message": "Reward sent successfully",
                "psid": req.psid,
                "referral_link": req.referral_link,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!("❌ Error sending reward to {}: {e}", req.psid);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to send reward"})),
            )
                .into_response()
        }
    }
}
