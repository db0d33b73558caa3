//! Embedding and generation backends (Gemini, Ollama).
//!
//! The pipeline only sees the `Embedder` and `Generator` traits; the concrete
//! client is picked from `llm.backend` at startup and shared by all requests.

mod gemini;
mod ollama;

pub use gemini::{GeminiClient, GeminiError};
pub use ollama::{ChatMessage, OllamaClient, OllamaError};

use async_trait::async_trait;

/// Fixed-dimension vector representation of a text.
pub type EmbeddingVector = Vec<f32>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error(transparent)]
    Gemini(#[from] GeminiError),
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error("backend returned no {0}")]
    Empty(&'static str),
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, LlmError>;
}

/// Produces answer text for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, LlmError> {
        let values = self.embed_content(text).await?;
        if values.is_empty() {
            return Err(LlmError::Empty("embedding"));
        }
        Ok(values)
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let text = self.generate_content(prompt).await?;
        if text.trim().is_empty() {
            return Err(LlmError::Empty("generated text"));
        }
        Ok(text)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, LlmError> {
        let values = OllamaClient::embed(self, text).await?;
        if values.is_empty() {
            return Err(LlmError::Empty("embedding"));
        }
        Ok(values)
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let messages = vec![ChatMessage::user(prompt)];
        let res = self.chat(messages).await?;
        let text = res.content();
        if text.trim().is_empty() {
            return Err(LlmError::Empty("generated text"));
        }
        Ok(text.to_string())
    }
}
