//! Trait seams between crates.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::GenerateParams;

/// A generative-AI backend. The platform uses exactly one at a time;
/// everything degrades to keyword heuristics when it is unavailable.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider is configured well enough to try a call.
    fn is_available(&self) -> bool;

    /// Single-prompt text generation.
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String>;

    /// Embed a batch of texts. Order of the output matches the input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// An inbound/outbound chat surface (Telegram today).
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<()>;

    /// Send a text reply to a thread (chat id as string).
    async fn send(&self, thread_id: &str, text: &str) -> Result<()>;
}
