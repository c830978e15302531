pub mod openai_compat;

use anyhow::Result;
use async_trait::async_trait;

pub use openai_compat::OpenAiCompatModel;

/// Text-in, text-out language model used for summarization
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs and the interaction record
    fn name(&self) -> &str;

    /// Whether the backing service can be reached at all
    async fn is_available(&self) -> bool;

    /// One blocking round trip. Errors carry the server's text so callers can
    /// recognise capacity failures.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
