/// Memory-bounded lifecycle around the native embedding backend.
///
/// The provider owns at most one backend instance per process and moves it
/// through `NotLoaded → Loading → Ready`, back to `NotLoaded` on idle
/// timeout or explicit release, and into `Error` on a failed load. Load,
/// embed, release, and the periodic idle check all serialize on one
/// `tokio::sync::Mutex`, so an embed can never overlap a load or unload
/// transition. `embed` after an idle eviction transparently re-initializes.
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::onnx::OnnxEmbedder;
use super::{Embedder, EmbedderError};
use crate::config::ModelConfig;
use crate::error::{EngineError, Result};

/// Externally observable provider state. This is how callers distinguish
/// "no relevant knowledge found" from "engine unavailable".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    NotLoaded,
    Loading,
    Ready,
    Error(String),
}

/// Factory producing a loaded backend. Lets tests substitute the native
/// ONNX model with a mock while keeping the lifecycle identical.
pub trait BackendFactory: Send + Sync {
    fn load(&self, cfg: &ModelConfig) -> std::result::Result<Box<dyn Embedder>, EmbedderError>;
}

/// Default factory: resolve the model artifact on disk and load it through
/// ONNX Runtime.
pub struct OnnxBackendFactory;

impl BackendFactory for OnnxBackendFactory {
    fn load(&self, cfg: &ModelConfig) -> std::result::Result<Box<dyn Embedder>, EmbedderError> {
        let model_dir = resolve_model_dir(cfg).ok_or_else(|| {
            EmbedderError::ModelLoadFailed(format!(
                "model {:?} not found in bundled, app-storage, or downloads locations",
                cfg.name
            ))
        })?;
        info!("Loading embedding model from {}", model_dir.display());
        let backend = OnnxEmbedder::new(&model_dir, cfg.dimensions)?;
        Ok(Box::new(backend))
    }
}

/// Resolve the model directory by priority: configured bundled directory,
/// then app data storage, then the user downloads folder.
#[must_use]
pub fn resolve_model_dir(cfg: &ModelConfig) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(bundled) = &cfg.bundled_dir {
        candidates.push(bundled.clone());
    }
    if let Some(data) = dirs::data_dir() {
        candidates.push(data.join("ragstone").join("models").join(&cfg.name));
    }
    if let Some(downloads) = dirs::download_dir() {
        candidates.push(downloads.join(&cfg.name));
    }

    candidates.into_iter().find(|dir| model_files_present(dir))
}

/// Files a model directory must contain to be loadable.
const MODEL_FILES: &[&str] = &["model.onnx", "tokenizer.json"];

#[must_use]
pub fn model_files_present(dir: &std::path::Path) -> bool {
    MODEL_FILES.iter().all(|name| dir.join(name).exists())
}

struct Loaded {
    backend: Box<dyn Embedder>,
    dimensions: usize,
    last_used: Instant,
}

/// Lazy-loaded, idle-evicted wrapper around the embedding backend.
pub struct EmbeddingProvider {
    cfg: ModelConfig,
    factory: Box<dyn BackendFactory>,
    loaded: Arc<TokioMutex<Option<Loaded>>>,
    status: Arc<RwLock<ProviderStatus>>,
    idle_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EmbeddingProvider {
    /// Create a provider backed by the native ONNX runtime. Nothing is
    /// loaded until the first `initialize()` or `embed()` call.
    #[must_use]
    pub fn new(cfg: ModelConfig) -> Self {
        Self::with_factory(cfg, Box::new(OnnxBackendFactory))
    }

    /// Create a provider with a custom backend factory (tests).
    #[must_use]
    pub fn with_factory(cfg: ModelConfig, factory: Box<dyn BackendFactory>) -> Self {
        Self {
            cfg,
            factory,
            loaded: Arc::new(TokioMutex::new(None)),
            status: Arc::new(RwLock::new(ProviderStatus::NotLoaded)),
            idle_task: std::sync::Mutex::new(None),
        }
    }

    /// Current externally observable state.
    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or(ProviderStatus::NotLoaded)
    }

    /// Output dimension of the loaded model, if any.
    pub async fn dimensions(&self) -> Option<usize> {
        self.loaded.lock().await.as_ref().map(|l| l.dimensions)
    }

    fn set_status(&self, status: ProviderStatus) {
        if let Ok(mut guard) = self.status.write() {
            *guard = status;
        }
    }

    /// Load the model if it is not already loaded. Idempotent: when Ready,
    /// only refreshes the last-used timestamp.
    pub async fn initialize(&self) -> Result<()> {
        let mut guard = self.loaded.lock().await;
        self.ensure_loaded(&mut guard)?;
        Ok(())
    }

    fn ensure_loaded(&self, guard: &mut Option<Loaded>) -> Result<()> {
        if let Some(loaded) = guard.as_mut() {
            loaded.last_used = Instant::now();
            return Ok(());
        }

        self.set_status(ProviderStatus::Loading);
        match self.factory.load(&self.cfg) {
            Ok(backend) => {
                let dimensions = backend.dimensions();
                info!("Embedding model ready ({dimensions} dimensions)");
                *guard = Some(Loaded {
                    backend,
                    dimensions,
                    last_used: Instant::now(),
                });
                self.set_status(ProviderStatus::Ready);
                self.spawn_idle_task();
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Embedding model load failed: {message}");
                self.set_status(ProviderStatus::Error(message.clone()));
                Err(EngineError::ModelLoadFailure(message))
            }
        }
    }

    /// Embed one text. Lazily initializes (including after an idle
    /// eviction) and refreshes the last-used timestamp.
    ///
    /// Returns `Ok(None)` when tokenization or inference fails for this
    /// text; callers treat that as "skip this chunk" or "fail this query".
    /// Only a model load failure is an error.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let mut guard = self.loaded.lock().await;
        self.ensure_loaded(&mut guard)?;

        let loaded = guard.as_mut().expect("loaded after ensure_loaded");
        loaded.last_used = Instant::now();

        match loaded.backend.embed(text) {
            Ok(vector) => Ok(Some(vector)),
            Err(EmbedderError::ModelLoadFailed(m)) => {
                self.set_status(ProviderStatus::Error(m.clone()));
                Err(EngineError::ModelLoadFailure(m))
            }
            Err(e) => {
                warn!("Embedding failed, skipping text: {e}");
                Ok(None)
            }
        }
    }

    /// Embed many texts sequentially. The backend has no internal
    /// parallelism, so batch calls do not overlap.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Free the backend and return to `NotLoaded`.
    pub async fn release(&self) {
        let mut guard = self.loaded.lock().await;
        if guard.take().is_some() {
            info!("Embedding model released");
        }
        self.set_status(ProviderStatus::NotLoaded);
    }

    /// Release the backend and stop the idle-check task. Call once when the
    /// owning engine shuts down.
    pub async fn shutdown(&self) {
        self.release().await;
        if let Ok(mut slot) = self.idle_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    /// Start the periodic idle check, once. The task acquires the same lock
    /// as load/embed/release before evicting, and dies with the provider.
    fn spawn_idle_task(&self) {
        let Ok(mut slot) = self.idle_task.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }

        let loaded = Arc::clone(&self.loaded);
        let status = Arc::clone(&self.status);
        let timeout = self.cfg.idle_timeout();
        let every = self.cfg.idle_check_interval();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                let mut guard = loaded.lock().await;
                let evict = guard
                    .as_ref()
                    .is_some_and(|l| l.last_used.elapsed() >= timeout);
                if evict {
                    guard.take();
                    if let Ok(mut s) = status.write() {
                        *s = ProviderStatus::NotLoaded;
                    }
                    info!("Embedding model evicted after {}s idle", timeout.as_secs());
                } else {
                    debug!("Idle check: model in use or not loaded");
                }
            }
        }));
    }
}

impl Drop for EmbeddingProvider {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.idle_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
