// Hosted model providers
// Embedding and chat-completion seams plus the OpenAI-compatible client behind them

pub mod openai;

pub use openai::ProviderClient;

use crate::Result;

/// Turns text into a vector for similarity search.
///
/// Implementations block for the full round-trip; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces a free-text answer from a system persona and a user prompt.
pub trait ChatModel: Send + Sync {
    fn complete(&self, system: &str, user: &str) -> Result<String>;
}
