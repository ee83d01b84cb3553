/// Embedder trait and shared types for text embedding.
pub mod mock;
pub mod onnx;
pub mod provider;
pub mod tokenizer;

use thiserror::Error;

/// Errors that can occur during embedding operations.
///
/// `ModelLoadFailed` is fatal to the triggering call; the other variants are
/// per-text failures that the provider degrades to an absent vector.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding backends.
///
/// All implementations must be `Send + Sync` to allow use behind `Arc`.
/// Backends have no internal parallelism; callers serialize access.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into an L2-normalized vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, sequentially.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}
