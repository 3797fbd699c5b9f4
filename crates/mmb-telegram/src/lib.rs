//! Telegram adapter (teloxide).
//!
//! Thin UI wiring over `mmb-core`: every inbound update resolves its user
//! through the directory, keyboards drive model choice and the chat dialogue,
//! and replies come from the NIM client.

pub mod handlers;
pub mod keyboards;
pub mod router;
