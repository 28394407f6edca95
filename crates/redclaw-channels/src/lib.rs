//! # RedClaw Channels
//!
//! Chat surfaces. Telegram is the only one today: long polling in, markdown
//! replies out, with an authorized-user gate on everything inbound.

pub mod commands;
pub mod telegram;

pub use commands::Command;
pub use telegram::{InboundDocument, InboundMessage, TelegramChannel};
