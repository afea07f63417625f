//! # ReferBot Channels
//! Outbound Messenger transport and the Google Sheets template source.

pub mod messenger;
pub mod sheets;

pub use messenger::MessengerChannel;
pub use sheets::SheetsSource;
