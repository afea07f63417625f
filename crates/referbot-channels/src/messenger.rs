//! Facebook Messenger Send API channel.
//!
//! Uses the Graph API `me/messages` endpoint with a Page access token.

use async_trait::async_trait;
use referbot_core::config::MessengerConfig;
use referbot_core::traits::MessageTransport;
use referbot_core::{OutgoingMessage, ReferBotError, Result};
use std::time::Duration;

const GRAPH_BASE: &str = "https://graph.facebook.com";

/// Messenger channel implementation.
pub struct MessengerChannel {
    config: MessengerConfig,
    client: reqwest::Client,
    base_url: String,
}

impl MessengerChannel {
    pub fn new(config: MessengerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            base_url: GRAPH_BASE.to_string(),
        }
    }

    /// Point at a different Graph host (local mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.config.page_access_token.is_empty()
    }

    fn send_url(&self) -> String {
        format!("{}/{}/me/messages", self.base_url, self.config.graph_api_version)
    }

    /// Send a text message. Returns the Graph message id.
    pub async fn send_text(&self, psid: &str, text: &str) -> Result<String> {
        if psid.is_empty() {
            return Err(ReferBotError::Transport("Missing PSID for send".into()));
        }
        if text.is_empty() {
            return Err(ReferBotError::Transport("Missing message payload for send".into()));
        }
        if !self.is_configured() {
            return Err(ReferBotError::Config("PAGE_ACCESS_TOKEN is not configured".into()));
        }

        let response = self
            .client
            .post(self.send_url())
            .query(&[("access_token", self.config.page_access_token.as_str())])
            .json(&send_body(psid, text))
            .send()
            .await
            .map_err(|e| ReferBotError::Transport(format!("Messenger request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let msg_id = parse_send_response(status, &body)?;
        tracing::debug!("Messenger message sent: {} → {}", msg_id, psid);
        Ok(msg_id)
    }
}

fn send_body(psid: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "recipient": { "id": psid },
        "message": { "text": text }
    })
}

/// Interpret a Send API reply. Non-2xx or an `error` object is a failure.
fn parse_send_response(status: u16, body: &str) -> Result<String> {
    let json: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    if !(200..300).contains(&status) {
        return Err(ReferBotError::Transport(format!(
            "Send API failed with status {status}: {body}"
        )));
    }
    if let Some(err) = json.get("error") {
        let message = err["message"].as_str().unwrap_or("Unknown Send API error");
        return Err(ReferBotError::Transport(message.to_string()));
    }
    Ok(json["message_id"].as_str().unwrap_or("unknown").to_string())
}

#[async_trait]
impl MessageTransport for MessengerChannel {
    fn name(&self) -> &str {
        "messenger"
    }

    async fn send(&self, recipient_id: &str, message: &OutgoingMessage) -> Result<()> {
        self.send_text(recipient_id, &message.text).await?;
        Ok(())
    }
}
