//! Shared fixtures for gateway tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use referbot_core::config::ReferBotConfig;
use referbot_core::traits::{MessageTransport, TemplateSource};
use referbot_core::{Clock, ManualClock, OutgoingMessage, ReferBotError, Result};
use referbot_db::ReferralDb;
use referbot_scheduler::FollowupEngine;
use std::sync::{Arc, Mutex};

use crate::server::AppState;

#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl Recorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn send(&self, recipient_id: &str, message: &OutgoingMessage) -> Result<()> {
        if self.fail {
            return Err(ReferBotError::Transport("down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), message.text.clone()));
        Ok(())
    }
}

struct Rows(Vec<Vec<String>>);

#[async_trait]
impl TemplateSource for Rows {
    fn name(&self) -> &str {
        "rows"
    }

    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.0.clone())
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// In-memory state; `rows` wires an engine over that sheet grid.
pub fn test_state(transport: Arc<Recorder>, rows: Option<&[&[&str]]>) -> AppState {
    let mut config = ReferBotConfig::default();
    config.referral.base_url = "https://x.test/ref/".into();
    config.messenger.verify_token = "s3cret".into();
    let db = Arc::new(ReferralDb::open_in_memory().unwrap());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
    let engine = rows.map(|rows| {
        let grid: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        Arc::new(FollowupEngine::from_config(
            &config.scheduler,
            Arc::new(Rows(grid)),
            db.clone(),
            transport.clone(),
            clock.clone(),
        ))
    });
    AppState {
        config,
        db,
        transport,
        engine,
        clock,
        start_time: std::time::Instant::now(),
    }
}
