/// Error taxonomy for the knowledge engine.
///
/// Per-chunk and per-query embedding failures are deliberately *not* part of
/// this enum: they degrade to "skip this chunk" / "empty result" and surface
/// as `Ok(None)` from the embedding provider.
use thiserror::Error;

/// Errors raised by ingestion, retrieval, and the chunk store.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No text extractor is registered for the file extension.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The extractor ran but produced no usable text (unreadable file,
    /// scanned PDF without a text layer, ...).
    #[error("text extraction failed: {0}")]
    ExtractionFailure(String),

    /// Extraction succeeded but the chunker produced nothing.
    #[error("document contains no extractable text")]
    EmptyDocument,

    /// The embedding model could not be loaded. Fatal to the triggering call.
    #[error("model load failed: {0}")]
    ModelLoadFailure(String),

    /// Propagated verbatim from the chunk store.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
