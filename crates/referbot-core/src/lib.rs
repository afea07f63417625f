//! # ReferBot Core
//! Shared data model, collaborator traits, configuration and errors.

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ReferBotConfig;
pub use error::{ReferBotError, Result};
pub use traits::{MessageTransport, ProgressStore, TemplateSource};
pub use types::{OutgoingMessage, RecipientProgress, Template};
