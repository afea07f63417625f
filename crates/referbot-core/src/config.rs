//! ReferBot configuration system.
//!
//! Loaded from `~/.referbot/config.toml` (or an explicit path), then
//! overridden by the environment variables the bot has always been
//! deployed with (`GOOGLE_SHEET_ID`, `PAGE_ACCESS_TOKEN`, ...).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReferBotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferBotConfig {
    #[serde(default)]
    pub sheet: SheetConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub messenger: MessengerConfig,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl ReferBotConfig {
    /// Load config from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReferBotError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReferBotError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the ReferBot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".referbot")
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("GOOGLE_SHEET_ID") {
            self.sheet.sheet_id = v;
        }
        if let Some(v) = text("GOOGLE_SHEET_RANGE") {
            self.sheet.range = v;
        }
        if let Some(v) = text("GOOGLE_API_KEY") {
            self.sheet.api_key = v;
        }
        if let Some(v) = text("GOOGLE_ACCESS_TOKEN") {
            self.sheet.access_token = v;
        }
        if let Some(v) = text("PAGE_ACCESS_TOKEN") {
            self.messenger.page_access_token = v;
        }
        if let Some(v) = text("VERIFY_TOKEN") {
            self.messenger.verify_token = v;
        }
        if let Some(v) = text("REFERRAL_BASE_URL") {
            self.referral.base_url = v;
        }
        if let Some(v) = text("REFERBOT_DB_PATH") {
            self.database.path = v;
        }

        if let Some(v) = parse_number(&text, "MESSAGE_TEMPLATE_REFRESH_MINUTES") {
            self.scheduler.template_refresh_minutes = v;
        }
        if let Some(v) = parse_number(&text, "MESSAGE_WORKER_INTERVAL_SECONDS") {
            self.scheduler.worker_interval_secs = v;
        }
        if let Some(v) = parse_number(&text, "MESSAGE_TEMPLATE_ERROR_COOLDOWN_SECONDS") {
            self.scheduler.error_cooldown_secs = v;
        }
        if let Some(v) = parse_number::<u16>(&text, "PORT") {
            self.gateway.port = v;
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    text: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = text(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("⚠️ Ignoring {key}={raw}: not a valid number");
            None
        }
    }
}

/// Template spreadsheet location and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Spreadsheet id. Empty disables the follow-up scheduler.
    #[serde(default)]
    pub sheet_id: String,
    #[serde(default = "default_sheet_range")]
    pub range: String,
    #[serde(default)]
    pub api_key: String,
    /// OAuth token with `spreadsheets.readonly` scope, used instead of
    /// `api_key` when set. Service-account tokens are minted outside the bot
    /// (`gcloud auth print-access-token`) and expire after about an hour.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_sheet_range() -> String { "Sheet1!A:D".into() }
fn default_request_timeout() -> u64 { 10 }

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            sheet_id: String::new(),
            range: default_sheet_range(),
            api_key: String::new(),
            access_token: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SheetConfig {
    pub fn is_configured(&self) -> bool {
        !self.sheet_id.trim().is_empty()
    }
}

/// Follow-up scheduler timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_refresh_minutes")]
    pub template_refresh_minutes: u64,
    #[serde(default = "default_worker_interval")]
    pub worker_interval_secs: u64,
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
    /// Recipients processed concurrently within one sweep.
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,
    /// Query parameter carrying the recipient id on referral links.
    #[serde(default = "default_link_param")]
    pub link_param: String,
}

fn default_refresh_minutes() -> u64 { 10 }
fn default_worker_interval() -> u64 { 60 }
fn default_error_cooldown() -> u64 { 60 }
fn default_sweep_concurrency() -> usize { 4 }
fn default_link_param() -> String { "id".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            template_refresh_minutes: default_refresh_minutes(),
            worker_interval_secs: default_worker_interval(),
            error_cooldown_secs: default_error_cooldown(),
            sweep_concurrency: default_sweep_concurrency(),
            link_param: default_link_param(),
        }
    }
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.template_refresh_minutes.saturating_mul(60))
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs.max(1))
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}

/// Facebook Messenger Send API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    #[serde(default)]
    pub page_access_token: String,
    /// Token Facebook echoes back during webhook subscription.
    #[serde(default)]
    pub verify_token: String,
    #[serde(default = "default_graph_version")]
    pub graph_api_version: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_graph_version() -> String { "v18.0".into() }

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            page_access_token: String::new(),
            verify_token: String::new(),
            graph_api_version: default_graph_version(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Referral link generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String { "https://your-app.com/ref/".into() }

impl Default for ReferralConfig {
    fn default() -> Self {
        Self { base_url: default_base_url() }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 3000 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.referbot/referrals.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}
