use chrono::{DateTime, Utc};

/// A persisted document record. `is_indexed = true` implies `chunk_count`
/// equals the number of successfully embedded chunk rows for it.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub source_type: String,
    pub source_path: String,
    pub file_size: u64,
    pub chunk_count: usize,
    pub is_indexed: bool,
    pub index_progress: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert form of a chunk: borrowed content plus its embedding vector.
#[derive(Debug, Clone)]
pub struct NewChunk<'a> {
    /// Position within the document. Monotonic but not necessarily
    /// contiguous; chunks whose embedding failed leave gaps.
    pub chunk_index: usize,
    pub content: &'a str,
    pub embedding: &'a [f32],
    pub token_count: usize,
    pub metadata: Option<&'a str>,
}

/// A chunk row read back from the store, embedding decoded.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    pub token_count: usize,
    pub metadata: Option<String>,
}

/// Display metadata joined from a chunk's owning document.
#[derive(Debug, Clone)]
pub struct ChunkDisplay {
    pub chunk_id: i64,
    pub document_title: String,
    pub source_path: String,
}
