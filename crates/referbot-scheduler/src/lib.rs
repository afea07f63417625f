//! # ReferBot Scheduler
//!
//! Drip-feeds follow-up messages to every referral recipient.
//!
//! ## Architecture
//! ```text
//! Template sheet ──▶ TemplateStore (cache, single-flight, error cooldown)
//!                          │
//! Sweeper (tokio interval) ├──▶ for each recipient ─┐
//! Webhook first contact ───┘                        ▼
//!                              RecipientLocks ─▶ due::evaluate ─▶ Deliverer
//!                                                                   ├── MessageTransport::send
//!                                                                   └── ProgressStore::advance
//! ```
//!
//! A recipient at `step = k` receives template `k` once
//! `reference_time + delay` has passed, where the reference time is the last
//! send (or account creation for the first template).

pub mod deliver;
pub mod due;
pub mod engine;
pub mod locks;
pub mod parse;
pub mod templates;

#[cfg(test)]
mod testing;

pub use deliver::{Deliverer, link_with_recipient, render_message};
pub use due::{DueState, evaluate, next_due};
pub use engine::{FollowupEngine, SweepReport, SweeperHandle, Visit, spawn_sweeper};
pub use locks::{RecipientGuard, RecipientLocks};
pub use parse::{ColumnMap, detect_columns, parse_delay_to_hours};
pub use templates::{CacheStatus, TemplateStore, templates_from_rows};
