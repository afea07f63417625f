//! # ReferBot Gateway
//! Messenger webhook, first-contact handling and a small JSON API, on Axum.

pub mod contact;
pub mod routes;
pub mod server;

#[cfg(test)]
mod testing;

pub use contact::{generate_referral_code, handle_first_contact};
pub use server::{AppState, build_router, start};
