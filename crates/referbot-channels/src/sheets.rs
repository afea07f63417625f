//! Google Sheets template source.
//!
//! Reads a cell range through the Sheets v4 `values.get` endpoint, using
//! either an API key (public sheets) or an OAuth bearer token.
//!
//! For a private sheet shared with a service account, mint a token outside
//! the bot, e.g. `gcloud auth print-access-token --impersonate-service-account=<sa>`
//! with scope `spreadsheets.readonly`, and pass it as `GOOGLE_ACCESS_TOKEN`.
//! Such tokens expire after about an hour; an expired token shows up as a
//! `SourceUnavailable` fetch error and the cached templates keep being used.

use async_trait::async_trait;
use referbot_core::config::SheetConfig;
use referbot_core::traits::TemplateSource;
use referbot_core::{ReferBotError, Result};
use std::time::Duration;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct SheetsSource {
    config: SheetConfig,
    client: reqwest::Client,
    base_url: String,
}

impl SheetsSource {
    pub fn new(config: SheetConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            base_url: SHEETS_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn values_url(&self) -> String {
        format!(
            "{}/{}/values/{}",
            self.base_url,
            urlencoding::encode(&self.config.sheet_id),
            urlencoding::encode(&self.config.range)
        )
    }
}

/// How a values.get request authenticates. A bearer token wins over a key.
#[derive(Debug, PartialEq, Eq)]
enum SheetAuth<'a> {
    Bearer(&'a str),
    ApiKey(&'a str),
    Anonymous,
}

fn sheet_auth(config: &SheetConfig) -> SheetAuth<'_> {
    if !config.access_token.trim().is_empty() {
        SheetAuth::Bearer(config.access_token.trim())
    } else if !config.api_key.trim().is_empty() {
        SheetAuth::ApiKey(config.api_key.trim())
    } else {
        SheetAuth::Anonymous
    }
}

/// Pull the `values` grid out of a values.get reply. No `values` → empty.
fn parse_values(json: &serde_json::Value) -> Vec<Vec<String>> {
    let Some(rows) = json["values"].as_array() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_text).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TemplateSource for SheetsSource {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
        if !self.config.is_configured() {
            return Err(ReferBotError::Config("GOOGLE_SHEET_ID not configured".into()));
        }

        let req = self.client.get(self.values_url());
        let req = match sheet_auth(&self.config) {
            SheetAuth::Bearer(token) => req.bearer_auth(token),
            SheetAuth::ApiKey(key) => req.query(&[("key", key)]),
            SheetAuth::Anonymous => {
                tracing::warn!("⚠️ No Google credentials configured, fetching sheet anonymously");
                req
            }
        };

        let response = req
            .send()
            .await
            .map_err(|e| ReferBotError::SourceUnavailable(format!("Sheets request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ReferBotError::SourceUnavailable(format!(
                "Sheets API error {status}: {text}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReferBotError::SourceUnavailable(format!("Invalid Sheets response: {e}")))?;
        Ok(parse_values(&json))
    }
}
