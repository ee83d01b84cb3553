//! Engine composition root.
//!
//! `KnowledgeEngine` wires the store, embedding provider, cache, progress
//! tracker, pipeline, and retrieval front end together. All components are
//! constructed here explicitly and shut down explicitly; nothing is a
//! process-global singleton.
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex as TokioMutex, watch};
use tracing::info;

use crate::cache::RetrievalCache;
use crate::config::EngineConfig;
use crate::embedder::provider::{
    BackendFactory, EmbeddingProvider, OnnxBackendFactory, ProviderStatus,
};
use crate::error::Result;
use crate::extract::ExtractorRegistry;
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::progress::ProgressTracker;
use crate::search::{CandidateScope, RetrievalEngine, RetrievalResult};
use crate::store::Db;
use crate::store::models::Document;

/// The on-device knowledge engine.
///
/// One instance owns one database, one embedding provider, and one cache.
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct KnowledgeEngine {
    config: EngineConfig,
    db: Arc<TokioMutex<Db>>,
    provider: Arc<EmbeddingProvider>,
    cache: Arc<RetrievalCache>,
    progress: Arc<ProgressTracker>,
    pipeline: IngestionPipeline,
    retrieval: RetrievalEngine,
}

impl KnowledgeEngine {
    /// Build an engine backed by the native ONNX runtime and the database
    /// at `config.db_path`. The model is not loaded until first use.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(OnnxBackendFactory), ExtractorRegistry::with_defaults())
    }

    /// Build an engine with a custom embedding backend factory and extractor
    /// registry. This is how tests run the full pipeline without model files
    /// and how hosts plug in extra document formats.
    pub fn with_factory(
        config: EngineConfig,
        factory: Box<dyn BackendFactory>,
        extractors: ExtractorRegistry,
    ) -> Result<Self> {
        let db = Arc::new(TokioMutex::new(Db::open(&config.db_path)?));
        let provider = Arc::new(EmbeddingProvider::with_factory(
            config.model.clone(),
            factory,
        ));
        let cache = Arc::new(RetrievalCache::new(config.cache_capacity));
        let progress = Arc::new(ProgressTracker::new());

        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            Arc::clone(&provider),
            extractors,
            config.chunking.clone(),
            Arc::clone(&cache),
            Arc::clone(&progress),
        );
        let retrieval = RetrievalEngine::new(
            Arc::clone(&db),
            Arc::clone(&provider),
            Arc::clone(&cache),
        );

        info!("Knowledge engine ready (db: {})", config.db_path);
        Ok(Self {
            config,
            db,
            provider,
            cache,
            progress,
            pipeline,
            retrieval,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest one file into the knowledge base.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        self.pipeline.ingest_file(path).await
    }

    /// Retrieve the chunks most relevant to `query` across all documents.
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.retrieval
            .search(query, &self.config.search, &CandidateScope::All)
            .await
    }

    /// Retrieve relevant chunks restricted to a candidate scope.
    pub async fn search_scoped(
        &self,
        query: &str,
        scope: &CandidateScope,
    ) -> Result<Vec<RetrievalResult>> {
        self.retrieval
            .search(query, &self.config.search, scope)
            .await
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let db = self.db.lock().await;
        Ok(db.list_documents()?)
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let db = self.db.lock().await;
        Ok(db.get_document(id)?)
    }

    /// Delete a document and its chunks. Returns whether it existed. The
    /// retrieval cache is invalidated when a row was removed.
    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            db.delete_document_by_id(id)?
        };
        if deleted {
            self.cache.clear();
            self.progress.clear(id);
            info!("Deleted document {id}");
        }
        Ok(deleted)
    }

    /// Latest ingestion progress for a document, if it is being tracked.
    #[must_use]
    pub fn ingest_progress(&self, document_id: i64) -> Option<f32> {
        self.progress.get(document_id)
    }

    /// Subscribe to a document's ingestion progress updates.
    #[must_use]
    pub fn subscribe_progress(&self, document_id: i64) -> Option<watch::Receiver<f32>> {
        self.progress.subscribe(document_id)
    }

    /// Load the embedding model now instead of on first use.
    pub async fn warm_up(&self) -> Result<()> {
        self.provider.initialize().await
    }

    /// Free the embedding model without shutting the engine down. The next
    /// embed reloads it.
    pub async fn release_model(&self) {
        self.provider.release().await;
    }

    /// Current embedding backend state.
    #[must_use]
    pub fn model_status(&self) -> ProviderStatus {
        self.provider.status()
    }

    /// Release the model and stop background tasks. Call once before drop.
    pub async fn shutdown(&self) {
        self.provider.shutdown().await;
        info!("Knowledge engine shut down");
    }
}
