// Model provider module
// Trait seams for the embedding and generation collaborators, plus the
// Ollama-backed implementation of both

pub mod ollama;

use crate::Result;

pub use ollama::{ModelInfo, OllamaClient};

/// Turns text into a fixed-length embedding vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Errors with `ProviderUnavailable` when the endpoint cannot be
    /// reached and `Provider` for any other failure. No retries.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces a raw text completion for a prompt.
pub trait GenerationProvider: Send + Sync {
    /// Any failure surfaces as `Generation`; callers do not retry.
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

/// Per-call generation settings forwarded to the serving runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Identifier of the model to invoke.
    pub model: String,
    /// How long the runtime should keep the model resident after the call.
    /// Ollama duration syntax; "-1" means never unload.
    pub keep_alive: String,
    /// Optional cap on the number of generated tokens.
    pub num_predict: Option<u32>,
}

impl GenerationOptions {
    #[inline]
    pub fn new(model: impl Into<String>, keep_alive: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            keep_alive: keep_alive.into(),
            num_predict: None,
        }
    }

    #[inline]
    pub fn with_num_predict(mut self, num_predict: u32) -> Self {
        self.num_predict = Some(num_predict);
        self
    }
}
