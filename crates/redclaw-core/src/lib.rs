//! # RedClaw Core
//!
//! Shared foundation for the RedClaw cybersecurity agent platform:
//! configuration, the error type, common domain types, the trait seams
//! between crates, and prompt templates.

pub mod config;
pub mod error;
pub mod prompts;
pub mod traits;
pub mod types;

pub use config::RedClawConfig;
pub use error::{RedClawError, Result};
