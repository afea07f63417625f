//! In-memory collaborators for scheduler tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use referbot_core::traits::{MessageTransport, ProgressStore, TemplateSource};
use referbot_core::{OutgoingMessage, RecipientProgress, ReferBotError, Result};

#[derive(Default)]
pub struct FakeStore {
    records: Mutex<Vec<RecipientProgress>>,
    fail_writes: AtomicBool,
    fail_reads_for: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
}

impl FakeStore {
    pub fn with(records: Vec<RecipientProgress>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<RecipientProgress> {
        self.records.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn insert(&self, record: RecipientProgress) {
        self.records.lock().unwrap().push(record);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads_for(&self, id: &str) {
        self.fail_reads_for.lock().unwrap().insert(id.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressStore for FakeStore {
    async fn list_all(&self) -> Result<Vec<RecipientProgress>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.lock().unwrap().clone())
    }

    async fn find(&self, id: &str) -> Result<Option<RecipientProgress>> {
        if self.fail_reads_for.lock().unwrap().contains(id) {
            return Err(ReferBotError::Database(format!("read failed for {id}")));
        }
        Ok(self.get(id))
    }

    async fn advance(&self, id: &str, next_step: u32, sent_at: DateTime<Utc>) -> Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ReferBotError::Database("disk full".into()));
        }
        let mut records = self.records.lock().unwrap();
        let mut affected = 0;
        for r in records.iter_mut().filter(|r| r.id == id && r.step < next_step) {
            r.step = next_step;
            r.last_message_sent_at = Some(sent_at);
            affected += 1;
        }
        Ok(affected)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<(String, String)>>,
    fail_all: bool,
    fail_for: Mutex<HashSet<String>>,
}

impl FakeTransport {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn fail_for(&self, id: &str) {
        self.fail_for.lock().unwrap().insert(id.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, recipient_id: &str, message: &OutgoingMessage) -> Result<()> {
        if self.fail_all || self.fail_for.lock().unwrap().contains(recipient_id) {
            return Err(ReferBotError::Transport(format!("send to {recipient_id} failed")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), message.text.clone()));
        Ok(())
    }
}

/// Sheet returning a fixed grid.
pub struct StaticSheet {
    rows: Vec<Vec<String>>,
    pub calls: AtomicUsize,
}

impl StaticSheet {
    pub fn new(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TemplateSource for StaticSheet {
    fn name(&self) -> &str {
        "static-sheet"
    }

    async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}
