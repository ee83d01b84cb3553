/// Mock embedder for testing purposes.
///
/// Generates deterministic embeddings based on text hash, with optional
/// failure injection for exercising the degrade-to-absent paths.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from text hashes.
///
/// Useful for testing without loading a real ONNX model.
pub struct MockEmbedder {
    pub dimensions: usize,
    /// Texts containing this substring fail with `InferenceFailed`.
    fail_on: Option<String>,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_on: None,
        }
    }

    /// Create a mock that fails inference for texts containing `needle`.
    #[must_use]
    pub fn failing_on(dimensions: usize, needle: &str) -> Self {
        Self {
            dimensions,
            fail_on: Some(needle.to_string()),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(EmbedderError::InferenceFailed(format!(
                    "injected failure for {needle:?}"
                )));
            }
        }

        // Generate a deterministic embedding based on text hash
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();

        let bytes = hash.to_le_bytes();
        let mut embedding = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            embedding.push(bytes[i % 8] as f32 / 255.0);
        }

        Ok(super::onnx::l2_normalize(&embedding))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
