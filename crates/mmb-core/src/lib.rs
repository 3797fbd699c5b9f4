//! Core domain + application logic for the multi-model Telegram bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the NIM API
//! live in adapter crates; this crate owns configuration, the SQLite-backed
//! user store (connection pool, data access, profile entities) and the
//! process-wide user directory.

pub mod config;
pub mod errors;
pub mod logging;
pub mod store;

pub use errors::{Error, Result};
