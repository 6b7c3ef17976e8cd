//! Core domain + application logic for the WhatsApp reminder bot.
//!
//! This crate is intentionally framework-agnostic. The WhatsApp gateway lives
//! behind a port (trait) implemented in the adapter crate.

pub mod attach;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod drafts;
pub mod errors;
pub mod logging;
pub mod session;
pub mod transport;

pub use errors::{Error, Result};
