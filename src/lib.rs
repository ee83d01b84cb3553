//! On-device retrieval engine: ingest documents, chunk them semantically,
//! embed the chunks with a local ONNX model, and answer queries by cosine
//! similarity with keyword re-ranking. Everything runs in-process against a
//! SQLite store; no network access is required after the model is on disk.
pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod progress;
pub mod search;
pub mod store;

pub use config::EngineConfig;
pub use engine::KnowledgeEngine;
pub use error::{EngineError, Result};
pub use ingest::IngestReport;
pub use search::{CandidateScope, RetrievalResult};
