//! Ingestion pipeline: file → extracted text → chunks → embeddings → store.
//!
//! A document becomes visible to retrieval only after its chunks are
//! committed; any failure before that point rolls the document record back
//! so no half-ingested state survives.
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::cache::RetrievalCache;
use crate::chunker::{self, ChunkKind, SemanticChunk};
use crate::config::ChunkingConfig;
use crate::embedder::provider::EmbeddingProvider;
use crate::embedder::tokenizer::BertTokenizer;
use crate::error::{EngineError, Result};
use crate::extract::ExtractorRegistry;
use crate::progress::ProgressTracker;
use crate::store::Db;
use crate::store::models::NewChunk;

/// Chunk rows are committed in batches of this size so a slow disk never
/// holds one giant transaction.
const INSERT_BATCH_SIZE: usize = 10;

/// How long a finished document's progress channel stays observable before
/// being dropped.
const PROGRESS_LINGER: std::time::Duration = std::time::Duration::from_secs(1);

/// Outcome of one successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: i64,
    /// Chunks produced by the chunker.
    pub chunks_total: usize,
    /// Chunks embedded and persisted.
    pub chunks_embedded: usize,
    /// Chunks skipped because their embedding failed. Their indexes are
    /// left as gaps in the stored sequence.
    pub chunks_dropped: usize,
}

fn kind_label(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Heading => "heading",
        ChunkKind::Content => "content",
        ChunkKind::List => "list",
        ChunkKind::Table => "table",
    }
}

fn chunk_metadata(chunk: &SemanticChunk) -> String {
    json!({
        "kind": kind_label(chunk.kind),
        "section_title": chunk.section_title,
    })
    .to_string()
}

struct EmbeddedChunk {
    chunk_index: usize,
    content: String,
    embedding: Vec<f32>,
    token_count: usize,
    metadata: String,
}

fn commit_chunks(db: &mut Db, doc_id: i64, embedded: &[EmbeddedChunk]) -> Result<()> {
    for batch in embedded.chunks(INSERT_BATCH_SIZE) {
        let rows: Vec<NewChunk<'_>> = batch
            .iter()
            .map(|c| NewChunk {
                chunk_index: c.chunk_index,
                content: &c.content,
                embedding: &c.embedding,
                token_count: c.token_count,
                metadata: Some(c.metadata.as_str()),
            })
            .collect();
        db.insert_chunks(doc_id, &rows)?;
    }
    db.update_document_index_status(doc_id, true, embedded.len())?;
    Ok(())
}

/// Drives a file through extraction, chunking, embedding, and storage.
pub struct IngestionPipeline {
    db: Arc<TokioMutex<Db>>,
    provider: Arc<EmbeddingProvider>,
    extractors: ExtractorRegistry,
    chunking: ChunkingConfig,
    cache: Arc<RetrievalCache>,
    progress: Arc<ProgressTracker>,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        provider: Arc<EmbeddingProvider>,
        extractors: ExtractorRegistry,
        chunking: ChunkingConfig,
        cache: Arc<RetrievalCache>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            db,
            provider,
            extractors,
            chunking,
            cache,
            progress,
        }
    }

    /// Ingest one file end to end.
    ///
    /// Fails with `UnsupportedFormat` before any record is created. Later
    /// failures (extraction, empty document, model load, chunk commit)
    /// delete the document record before returning, so the store never
    /// exposes a document without chunks. Individual embedding failures
    /// drop the affected chunk and continue.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let extractor = self.extractors.select(&extension)?;

        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();
        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let document = {
            let db = self.db.lock().await;
            db.insert_document(&title, &extension, &path.to_string_lossy(), file_size)?
        };
        let doc_id = document.id;
        info!("Ingesting {} as document {doc_id}", path.display());

        self.publish(doc_id, 0.1).await;

        let text = match extractor.extract(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Extraction failed for document {doc_id}: {e}");
                self.rollback(doc_id).await;
                return Err(e);
            }
        };
        self.publish(doc_id, 0.2).await;

        let chunks = chunker::chunk(&text, &self.chunking);
        self.publish(doc_id, 0.3).await;

        if chunks.is_empty() {
            self.rollback(doc_id).await;
            return Err(EngineError::EmptyDocument);
        }

        let chunks_total = chunks.len();
        let mut embedded: Vec<EmbeddedChunk> = Vec::with_capacity(chunks_total);
        let mut dropped = 0usize;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let embed_input = if chunk.context_prefix.is_empty() {
                chunk.content.clone()
            } else {
                format!("{} {}", chunk.context_prefix, chunk.content)
            };

            let vector = match self.provider.embed(&embed_input).await {
                Ok(v) => v,
                Err(e) => {
                    self.rollback(doc_id).await;
                    return Err(e);
                }
            };

            match vector {
                Some(embedding) => embedded.push(EmbeddedChunk {
                    chunk_index: chunk.index,
                    content: chunk.content.clone(),
                    embedding,
                    token_count: BertTokenizer::approximate_token_count(&chunk.content),
                    metadata: chunk_metadata(&chunk),
                }),
                None => {
                    warn!(
                        "Dropping chunk {} of document {doc_id}: embedding unavailable",
                        chunk.index
                    );
                    dropped += 1;
                }
            }

            let fraction = 0.3 + 0.6 * (i + 1) as f32 / chunks_total as f32;
            self.publish(doc_id, fraction).await;
        }

        let committed = {
            let mut db = self.db.lock().await;
            commit_chunks(&mut db, doc_id, &embedded)
        };
        if let Err(e) = committed {
            warn!("Chunk commit failed for document {doc_id}: {e}");
            self.rollback(doc_id).await;
            return Err(e);
        }
        self.publish(doc_id, 1.0).await;

        // Indexed content changed; cached query results are stale
        self.cache.clear();

        let progress = Arc::clone(&self.progress);
        tokio::spawn(async move {
            tokio::time::sleep(PROGRESS_LINGER).await;
            progress.clear(doc_id);
        });

        info!(
            "Document {doc_id} indexed: {} of {chunks_total} chunks stored",
            embedded.len()
        );
        Ok(IngestReport {
            document_id: doc_id,
            chunks_total,
            chunks_embedded: embedded.len(),
            chunks_dropped: dropped,
        })
    }

    /// Push a progress value to both subscribers and the document row.
    async fn publish(&self, doc_id: i64, fraction: f32) {
        self.progress.publish(doc_id, fraction);
        let db = self.db.lock().await;
        if let Err(e) = db.update_document_index_progress(doc_id, fraction) {
            warn!("Failed to persist progress for document {doc_id}: {e}");
        }
    }

    /// Remove a partially ingested document and its progress channel.
    async fn rollback(&self, doc_id: i64) {
        let db = self.db.lock().await;
        if let Err(e) = db.delete_document_by_id(doc_id) {
            warn!("Rollback failed for document {doc_id}: {e}");
        }
        self.progress.clear(doc_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::embedder::mock::MockEmbedder;
    use crate::embedder::provider::BackendFactory;
    use crate::embedder::{Embedder, EmbedderError};
    use std::io::Write;

    struct MockFactory {
        fail_on: Option<String>,
    }

    impl BackendFactory for MockFactory {
        fn load(
            &self,
            cfg: &ModelConfig,
        ) -> std::result::Result<Box<dyn Embedder>, EmbedderError> {
            match &self.fail_on {
                Some(needle) => Ok(Box::new(MockEmbedder::failing_on(cfg.dimensions, needle))),
                None => Ok(Box::new(MockEmbedder::new(cfg.dimensions))),
            }
        }
    }

    struct LoadFailFactory;
    impl BackendFactory for LoadFailFactory {
        fn load(
            &self,
            _cfg: &ModelConfig,
        ) -> std::result::Result<Box<dyn Embedder>, EmbedderError> {
            Err(EmbedderError::ModelLoadFailed("no model".into()))
        }
    }

    fn pipeline_with(factory: Box<dyn BackendFactory>) -> (IngestionPipeline, Arc<TokioMutex<Db>>, Arc<RetrievalCache>) {
        let db = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
        let cache = Arc::new(RetrievalCache::new(10));
        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            Arc::new(EmbeddingProvider::with_factory(
                ModelConfig::default(),
                factory,
            )),
            ExtractorRegistry::with_defaults(),
            ChunkingConfig::default(),
            Arc::clone(&cache),
            Arc::new(ProgressTracker::new()),
        );
        (pipeline, db, cache)
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{content}").unwrap();
        path
    }

    fn long_document() -> String {
        let mut text = String::from("# Sourdough Basics\n\n");
        for i in 0..12 {
            text.push_str(&format!(
                "Paragraph {i} covers flour hydration and fermentation schedules. \
                 The starter must be fed daily, and ambient temperature changes \
                 the rise time considerably. Keep notes on every bake.\n\n"
            ));
        }
        text
    }

    #[tokio::test]
    async fn test_ingest_file_end_to_end() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bread.txt", &long_document());

        let report = pipeline.ingest_file(&path).await.unwrap();
        assert!(report.chunks_total > 1);
        assert_eq!(report.chunks_embedded, report.chunks_total);
        assert_eq!(report.chunks_dropped, 0);

        let db = db.lock().await;
        let doc = db.get_document(report.document_id).unwrap().unwrap();
        assert!(doc.is_indexed);
        assert_eq!(doc.title, "bread");
        assert_eq!(doc.source_type, "txt");
        assert_eq!(doc.chunk_count, report.chunks_embedded);
        assert!((doc.index_progress - 1.0).abs() < 1e-6);
        assert_eq!(
            db.count_chunks_for_document(report.document_id).unwrap(),
            report.chunks_embedded
        );
    }

    #[tokio::test]
    async fn test_unsupported_format_creates_no_record() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "sheet.xlsx", "not really a spreadsheet");

        let err = pipeline.ingest_file(&path).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
        assert!(db.lock().await.list_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_rolls_back() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        let path = Path::new("/nonexistent/ghost.txt");

        let err = pipeline.ingest_file(path).await.unwrap_err();
        assert!(matches!(err, EngineError::ExtractionFailure(_)));
        assert!(db.lock().await.list_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_document_rolls_back() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "blank.txt", "   \n\n   ");

        let err = pipeline.ingest_file(&path).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyDocument));
        assert!(db.lock().await.list_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_load_failure_rolls_back() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(LoadFailFactory));
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "doc.txt", &long_document());

        let err = pipeline.ingest_file(&path).await.unwrap_err();
        assert!(matches!(err, EngineError::ModelLoadFailure(_)));
        assert!(db.lock().await.list_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_embedding_leaves_index_gap() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory {
            fail_on: Some("fermentation".to_string()),
        }));
        let dir = tempfile::tempdir().unwrap();
        // Only the first paragraph mentions fermentation. Its chunk fails,
        // and so does the next one because its context prefix carries the
        // first chunk's trailing sentences.
        let mut text = String::new();
        text.push_str(&"Bulk fermentation takes four hours at room temperature. ".repeat(12));
        text.push_str("\n\n");
        text.push_str(&"The middle section is about kneading dough by hand. ".repeat(12));
        text.push_str("\n\n");
        text.push_str(&"Finally the loaf is scored and baked on a hot stone. ".repeat(12));
        let path = write_file(&dir, "gaps.txt", &text);

        let report = pipeline.ingest_file(&path).await.unwrap();
        assert!(report.chunks_dropped >= 1);
        assert_eq!(
            report.chunks_embedded + report.chunks_dropped,
            report.chunks_total
        );

        let db = db.lock().await;
        let stored = db.get_all_chunks().unwrap();
        assert_eq!(stored.len(), report.chunks_embedded);
        // Surviving chunks keep their original indexes, so the dropped
        // chunks show up as a gap at the front rather than a renumbering
        let min_index = stored.iter().map(|c| c.chunk_index).min().unwrap();
        assert!(min_index > 0);
        for chunk in &stored {
            assert!(!chunk.content.contains("fermentation"));
        }
    }

    #[tokio::test]
    async fn test_store_failure_during_commit_rolls_back() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "doomed.txt", &long_document());

        // Break the chunk table so the commit fails after embedding
        db.lock()
            .await
            .conn
            .execute_batch("DROP TABLE chunks;")
            .unwrap();

        let err = pipeline.ingest_file(&path).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));

        let db = db.lock().await;
        assert!(db.list_documents().unwrap().is_empty());
        // The first document in a fresh store gets id 1; its progress
        // channel must be gone after the rollback
        assert_eq!(pipeline.progress.get(1), None);
    }

    #[tokio::test]
    async fn test_ingest_invalidates_cache() {
        let (pipeline, _db, cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        cache.put("stale query", Vec::new());
        assert_eq!(cache.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "fresh.txt", &long_document());
        pipeline.ingest_file(&path).await.unwrap();

        assert_eq!(cache.len(), 0, "ingestion must clear the retrieval cache");
    }

    #[tokio::test]
    async fn test_chunk_metadata_is_json() {
        let (pipeline, db, _cache) = pipeline_with(Box::new(MockFactory { fail_on: None }));
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "meta.txt", &long_document());

        pipeline.ingest_file(&path).await.unwrap();

        let db = db.lock().await;
        let stored = db.get_all_chunks().unwrap();
        let metadata = stored[0].metadata.as_deref().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(metadata).unwrap();
        assert!(parsed.get("kind").is_some());
        assert_eq!(
            parsed["section_title"].as_str(),
            Some("Sourdough Basics")
        );
    }
}
