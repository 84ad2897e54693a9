//! Model runtime behind the worker
//!
//! The worker loop only needs two things from a runtime: materialise a
//! model by name (reporting progress), and stream a reply for a message
//! list. `OllamaEngine` does both against a local Ollama server.

mod ollama;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::bridge::{ChatMessage, GenerationParams};

pub use ollama::{OllamaEngine, OllamaError, DEFAULT_OLLAMA_BASE_URL};

/// Stream of reply fragments, in emission order
pub type DeltaStream = BoxStream<'static, anyhow::Result<String>>;

/// Progress callback handed to `load`
pub type ProgressFn<'a> = &'a (dyn Fn(String) + Send + Sync);

#[async_trait]
pub trait InferenceEngine: Send {
    /// Make `model` the active model, replacing any previous one
    async fn load(&mut self, model: &str, progress: ProgressFn<'_>) -> anyhow::Result<()>;

    /// Generate a reply with the active model
    async fn generate(
        &mut self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> anyhow::Result<DeltaStream>;

    /// Runtime name for logging
    fn name(&self) -> &str;
}
