//! Follow-up engine — the sweep loop and the first-contact send.
//! Uses tokio::interval for ticking; sleeps between sweeps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use referbot_core::config::SchedulerConfig;
use referbot_core::traits::{MessageTransport, ProgressStore, TemplateSource};
use referbot_core::{Clock, RecipientProgress, Result, Template};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::deliver::Deliverer;
use crate::due::{DueState, evaluate};
use crate::locks::{RecipientGuard, RecipientLocks};
use crate::templates::TemplateStore;

/// What happened to one recipient during a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Sent,
    /// Due template rendered to nothing.
    Skipped,
    Waiting,
    Finished,
    /// Recipient vanished between listing and visiting.
    Missing,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub sent: usize,
    pub waiting: usize,
    pub finished: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &Result<Visit>) {
        self.scanned += 1;
        match outcome {
            Ok(Visit::Sent) => self.sent += 1,
            Ok(Visit::Waiting) => self.waiting += 1,
            Ok(Visit::Finished) => self.finished += 1,
            Ok(Visit::Skipped) | Ok(Visit::Missing) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Drives follow-up delivery for every recipient.
pub struct FollowupEngine {
    templates: Arc<TemplateStore>,
    deliverer: Deliverer,
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    locks: RecipientLocks,
    concurrency: usize,
}

impl FollowupEngine {
    pub fn new(
        templates: Arc<TemplateStore>,
        deliverer: Deliverer,
        store: Arc<dyn ProgressStore>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
    ) -> Self {
        Self {
            templates,
            deliverer,
            store,
            clock,
            locks: RecipientLocks::new(),
            concurrency: concurrency.max(1),
        }
    }

    /// Wire an engine from collaborators and the scheduler config section.
    pub fn from_config(
        config: &SchedulerConfig,
        source: Arc<dyn TemplateSource>,
        store: Arc<dyn ProgressStore>,
        transport: Arc<dyn MessageTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let templates = Arc::new(TemplateStore::new(
            source,
            clock.clone(),
            config.refresh_interval(),
            config.error_cooldown(),
        ));
        let deliverer = Deliverer::new(transport, store.clone(), clock.clone(), config.link_param.clone());
        Self::new(templates, deliverer, store, clock, config.sweep_concurrency)
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    pub fn link_param(&self) -> &str {
        self.deliverer.link_param()
    }

    /// Force a template load, e.g. at startup. Returns the template count.
    pub async fn warm_up(&self) -> usize {
        self.templates.load(true).await.len()
    }

    /// Exclusive access to one recipient's progress.
    ///
    /// Callers mutating progress outside the engine (e.g. a fallback send)
    /// must hold this so they never race a sweep or first-touch send.
    pub async fn lock_recipient(&self, id: &str) -> RecipientGuard {
        self.locks.acquire(id).await
    }

    /// One pass over every recipient.
    pub async fn sweep(&self) -> SweepReport {
        let templates = self.templates.load(false).await;
        if templates.is_empty() {
            tracing::debug!("⏭️ No templates loaded, skipping sweep");
            return SweepReport::default();
        }

        let recipients = match self.store.list_all().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("❌ Sweep aborted, cannot list recipients: {e}");
                return SweepReport::default();
            }
        };

        let mut seen = HashSet::new();
        let ids: Vec<String> = recipients
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .map(|r| r.id)
            .collect();

        let templates = &templates;
        let outcomes: Vec<(String, Result<Visit>)> = futures::stream::iter(ids)
            .map(|id| async move {
                let outcome = self.visit(&id, templates).await;
                (id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (id, outcome) in &outcomes {
            if let Err(e) = outcome {
                tracing::warn!("⚠️ Failed to process recipient {id}: {e}");
            }
            report.record(outcome);
        }
        if report.sent > 0 || report.failed > 0 {
            tracing::info!(
                "🔁 Sweep done: {} scanned, {} sent, {} failed",
                report.scanned,
                report.sent,
                report.failed
            );
        }
        report
    }

    /// Send the due template right away on first contact.
    ///
    /// Same path as one sweep visit, using the shared (non-forced) cache.
    /// Returns whether a message went out; failures are logged, not raised.
    pub async fn send_first_touch(&self, recipient: &RecipientProgress) -> bool {
        let templates = self.templates.load(false).await;
        if templates.is_empty() {
            return false;
        }
        match self.visit(&recipient.id, &templates).await {
            Ok(Visit::Sent) => true,
            Ok(Visit::Missing) => {
                tracing::warn!("⚠️ First-touch recipient {} not found in store", recipient.id);
                false
            }
            Ok(_) => false,
            Err(e) => {
                tracing::error!("❌ First-touch send to {} failed: {e}", recipient.id);
                false
            }
        }
    }

    /// Evaluate and maybe deliver for one recipient, under its lock, against
    /// a fresh read of its progress.
    async fn visit(&self, id: &str, templates: &[Template]) -> Result<Visit> {
        let _guard = self.locks.acquire(id).await;
        let Some(progress) = self.store.find(id).await? else {
            return Ok(Visit::Missing);
        };
        match evaluate(&progress, templates, self.clock.now()) {
            DueState::Due(template) => {
                if self.deliverer.deliver(&progress, template).await? {
                    Ok(Visit::Sent)
                } else {
                    Ok(Visit::Skipped)
                }
            }
            DueState::Waiting { due_at } => {
                tracing::debug!("⏳ {id}: template #{} due at {due_at}", progress.step);
                Ok(Visit::Waiting)
            }
            DueState::Exhausted => Ok(Visit::Finished),
        }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop ticking and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("⚠️ Sweeper task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the sweep loop as a background tokio task.
/// The first sweep runs one `period` after start.
pub fn spawn_sweeper(engine: Arc<FollowupEngine>, period: Duration) -> SweeperHandle {
    let (tx, mut rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        tracing::info!("⏰ Follow-up worker started (interval: {}s)", period.as_secs());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = rx.changed() => break,
            }
            // Not raced against shutdown: a sweep always runs to completion.
            engine.sweep().await;
            if *rx.borrow() {
                break;
            }
        }
        tracing::info!("🛑 Follow-up worker stopped");
    });
    SweeperHandle { shutdown: tx, task }
}
