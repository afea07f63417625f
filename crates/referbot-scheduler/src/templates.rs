//! Template store — cached message templates pulled from the sheet.
//!
//! One fetch at a time (single-flight), refresh every `refresh_interval`,
//! and after a failed fetch no retry until `error_cooldown` has passed. A
//! failed fetch never clears what we already have: stale templates beat none.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use referbot_core::traits::TemplateSource;
use referbot_core::{Clock, Template};
use tokio::sync::{Mutex, RwLock};

use crate::parse::{detect_columns, parse_delay_to_hours, parse_order};

/// Cached templates plus the timestamps that govern refresh.
#[derive(Debug, Clone, Default)]
struct CacheState {
    templates: Arc<Vec<Template>>,
    fetched_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl CacheState {
    fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    fn is_stale(&self, now: DateTime<Utc>, refresh_interval: chrono::Duration) -> bool {
        match self.fetched_at {
            Some(at) => now - at > refresh_interval,
            None => true,
        }
    }

    /// Identifies the last fetch attempt, successful or not.
    fn generation(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.fetched_at, self.cooldown_until)
    }
}

/// Cache snapshot for dashboards and logs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatus {
    pub template_count: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Owned template cache in front of a [`TemplateSource`].
pub struct TemplateStore {
    source: Arc<dyn TemplateSource>,
    clock: Arc<dyn Clock>,
    refresh_interval: chrono::Duration,
    error_cooldown: chrono::Duration,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl TemplateStore {
    pub fn new(
        source: Arc<dyn TemplateSource>,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
        error_cooldown: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            refresh_interval: to_chrono(refresh_interval),
            error_cooldown: to_chrono(error_cooldown),
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current templates, refreshing from the source when due.
    ///
    /// `force` skips the staleness check but still honours the error cooldown.
    pub async fn load(&self, force: bool) -> Arc<Vec<Template>> {
        let seen = {
            let state = self.state.read().await;
            if !self.should_refresh(&state, force) {
                return state.templates.clone();
            }
            state.generation()
        };

        let _flight = self.refresh_lock.lock().await;

        // Someone else refreshed (or failed) while we waited: reuse their outcome.
        {
            let state = self.state.read().await;
            if state.generation() != seen || !self.should_refresh(&state, force) {
                return state.templates.clone();
            }
        }

        self.refresh().await
    }

    /// Snapshot of the cache without touching the source.
    pub async fn status(&self) -> CacheStatus {
        let state = self.state.read().await;
        CacheStatus {
            template_count: state.templates.len(),
            fetched_at: state.fetched_at,
            cooldown_until: state.cooldown_until,
        }
    }

    fn should_refresh(&self, state: &CacheState, force: bool) -> bool {
        let now = self.clock.now();
        if state.in_cooldown(now) {
            return false;
        }
        force || state.templates.is_empty() || state.is_stale(now, self.refresh_interval)
    }

    /// Fetch and replace. Caller holds the refresh lock.
    async fn refresh(&self) -> Arc<Vec<Template>> {
        match self.source.fetch_rows().await {
            Ok(rows) => {
                let templates = Arc::new(templates_from_rows(&rows));
                let mut state = self.state.write().await;
                state.templates = templates.clone();
                state.fetched_at = Some(self.clock.now());
                state.cooldown_until = None;
                tracing::info!(
                    "📋 Loaded {} message templates from {}",
                    templates.len(),
                    self.source.name()
                );
                templates
            }
            Err(e) => {
                let mut state = self.state.write().await;
                let until = self.clock.now() + self.error_cooldown;
                state.cooldown_until = Some(until);
                tracing::error!(
                    "❌ Failed to load templates from {}: {e} (keeping {} cached, retry after {})",
                    self.source.name(),
                    state.templates.len(),
                    until.to_rfc3339()
                );
                state.templates.clone()
            }
        }
    }
}

/// Turn a raw sheet grid into the retained, densely indexed template list.
pub fn templates_from_rows(rows: &[Vec<String>]) -> Vec<Template> {
    if rows.len() <= 1 {
        return Vec::new();
    }
    let cols = detect_columns(&rows[0]);
    fn cell(row: &[String], idx: usize) -> Option<&str> {
        row.get(idx).map(String::as_str)
    }

    rows[1..]
        .iter()
        .map(|row| {
            (
                parse_order(cell(row, cols.order)),
                parse_delay_to_hours(cell(row, cols.delay)),
                cell(row, cols.message).unwrap_or("").trim().to_string(),
            )
        })
        .filter(|(_, _, message)| !message.is_empty())
        .enumerate()
        .map(|(index, (order, delay_hours, message))| {
            Template::new(order, delay_hours, message, index)
        })
        .collect()
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use referbot_core::{ManualClock, ReferBotError, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSheet {
        rows: std::sync::Mutex<Vec<Vec<String>>>,
        fail: AtomicBool,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeSheet {
        fn new(rows: Vec<Vec<&str>>) -> Self {
            Self {
                rows: std::sync::Mutex::new(to_rows(rows)),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TemplateSource for FakeSheet {
        fn name(&self) -> &str {
            "fake-sheet"
        }

        async fn fetch_rows(&self) -> Result<Vec<Vec<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReferBotError::SourceUnavailable("sheet down".into()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn to_rows(rows: Vec<Vec<&str>>) -> Vec<Vec<String>> {
        rows.into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect()
    }

    fn sheet_rows() -> Vec<Vec<&'static str>> {
        vec![
            vec!["Order", "Delay", "Ignore", "Content"],
            vec!["1", "0", "", "Welcome! [referral_link]"],
            vec!["2", "2", "", "   "],
            vec!["3", "90m", "", "Reminder {your_referral_link}"],
        ]
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn store(sheet: Arc<FakeSheet>, clock: Arc<ManualClock>) -> TemplateStore {
        TemplateStore::new(sheet, clock, Duration::from_secs(600), Duration::from_secs(60))
    }

    #[test]
    fn test_rows_to_templates_drops_empty_and_reindexes() {
        let templates = templates_from_rows(&to_rows(sheet_rows()));
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].index, 0);
        assert_eq!(templates[0].delay_ms, 0);
        assert_eq!(templates[1].index, 1);
        assert_eq!(templates[1].order, 3);
        assert_eq!(templates[1].delay_ms, 5_400_000);
        assert_eq!(templates[1].message, "Reminder {your_referral_link}");
    }

    #[test]
    fn test_rows_keep_source_order_not_order_column() {
        let rows = to_rows(vec![
            vec!["Step", "Hours", "x", "Message"],
            vec!["9", "1", "", "first row"],
            vec!["1", "2", "", "second row"],
        ]);
        let templates = templates_from_rows(&rows);
        assert_eq!(templates[0].message, "first row");
        assert_eq!(templates[0].order, 9);
        assert_eq!(templates[1].message, "second row");
        assert_eq!(templates[1].delay_ms, 7_200_000);
    }

    #[test]
    fn test_header_only_or_empty_sheet() {
        assert!(templates_from_rows(&[]).is_empty());
        assert!(templates_from_rows(&to_rows(vec![vec!["Order", "Delay", "", "Content"]])).is_empty());
    }

    #[test]
    fn test_short_rows_read_missing_cells_as_empty() {
        let rows = to_rows(vec![
            vec!["Order", "Delay", "Ignore", "Content"],
            vec!["1", "3"],
            vec!["2"],
            vec!["3", "", "", "kept"],
        ]);
        let templates = templates_from_rows(&rows);
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].index, 0);
        assert_eq!(templates[0].delay_ms, 0);
    }

    #[tokio::test]
    async fn test_load_caches_until_stale() {
        let sheet = Arc::new(FakeSheet::new(sheet_rows()));
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(sheet.clone(), clock.clone());

        assert_eq!(store.load(false).await.len(), 2);
        assert_eq!(store.load(false).await.len(), 2);
        assert_eq!(sheet.calls(), 1);

        clock.advance(chrono::Duration::minutes(10));
        store.load(false).await;
        assert_eq!(sheet.calls(), 1, "exactly at the interval is not stale yet");

        clock.advance(chrono::Duration::seconds(1));
        store.load(false).await;
        assert_eq!(sheet.calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refetches_fresh_cache() {
        let sheet = Arc::new(FakeSheet::new(sheet_rows()));
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(sheet.clone(), clock);

        store.load(false).await;
        store.load(true).await;
        assert_eq!(sheet.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_refetches_every_call() {
        let sheet = Arc::new(FakeSheet::new(vec![vec!["Order", "Delay", "", "Content"]]));
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(sheet.clone(), clock);

        assert!(store.load(false).await.is_empty());
        assert!(store.load(false).await.is_empty());
        assert_eq!(sheet.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_cache_and_cools_down() {
        let sheet = Arc::new(FakeSheet::new(sheet_rows()));
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(sheet.clone(), clock.clone());

        assert_eq!(store.load(false).await.len(), 2);

        sheet.fail.store(true, Ordering::SeqCst);
        let failed_at = t0();
        assert_eq!(store.load(true).await.len(), 2, "stale cache survives failure");
        assert_eq!(sheet.calls(), 2);
        let status = store.status().await;
        assert_eq!(status.cooldown_until, Some(failed_at + chrono::Duration::seconds(60)));

        clock.set(failed_at + chrono::Duration::seconds(30));
        assert_eq!(store.load(true).await.len(), 2);
        assert_eq!(sheet.calls(), 2, "forced reload inside cooldown must not fetch");

        sheet.fail.store(false, Ordering::SeqCst);
        clock.set(failed_at + chrono::Duration::seconds(61));
        assert_eq!(store.load(true).await.len(), 2);
        assert_eq!(sheet.calls(), 3);
        assert_eq!(store.status().await.cooldown_until, None);
    }

    #[tokio::test]
    async fn test_failure_on_first_load_returns_empty() {
        let sheet = Arc::new(FakeSheet::new(sheet_rows()));
        sheet.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(sheet.clone(), clock);

        assert!(store.load(false).await.is_empty());
        assert!(store.load(false).await.is_empty());
        assert_eq!(sheet.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_fetch_once() {
        let mut fake = FakeSheet::new(sheet_rows());
        fake.delay = Some(Duration::from_millis(50));
        let sheet = Arc::new(fake);
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(store(sheet.clone(), clock));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.load(true).await.len() })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), 2);
        }
        assert_eq!(sheet.calls(), 1);
    }
}
