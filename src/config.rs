/// Configuration for the knowledge engine.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./knowledge.db".to_string()
}

fn default_target_chunk_size() -> usize {
    500
}

fn default_max_chunk_size() -> usize {
    1000
}

fn default_min_chunk_size() -> usize {
    100
}

fn default_overlap_sentences() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_topic_change_threshold() -> f32 {
    0.3
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.15
}

fn default_keyword_weight() -> f32 {
    0.2
}

fn default_model_name() -> String {
    "multilingual-e5-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_idle_check_secs() -> u64 {
    60
}

fn default_cache_capacity() -> usize {
    50
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Controls for the semantic chunker. Sizes are in characters; the
/// `context_prefix` overlap does not count toward them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chunk_size")]
    pub target_chunk_size: usize,

    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    #[serde(default = "default_overlap_sentences")]
    pub overlap_sentences: usize,

    #[serde(default = "default_true")]
    pub detect_headings: bool,

    #[serde(default = "default_true")]
    pub detect_topic_boundary: bool,

    #[serde(default = "default_topic_change_threshold")]
    pub topic_change_threshold: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_true")]
    pub use_keyword_reranking: bool,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Highest-priority model location (bundled asset directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_dir: Option<PathBuf>,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_idle_check_secs")]
    pub idle_check_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            model: ModelConfig::default(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chunk_size: default_target_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap_sentences: default_overlap_sentences(),
            detect_headings: true,
            detect_topic_boundary: true,
            topic_change_threshold: default_topic_change_threshold(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            use_keyword_reranking: true,
            keyword_weight: default_keyword_weight(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
            bundled_dir: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            idle_check_secs: default_idle_check_secs(),
        }
    }
}

impl ModelConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_secs)
    }
}

// ── Config implementation ────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: EngineConfig = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.chunking.target_chunk_size > 0,
            "target_chunk_size must be positive"
        );
        anyhow::ensure!(
            self.chunking.max_chunk_size >= self.chunking.target_chunk_size,
            "max_chunk_size must be >= target_chunk_size"
        );
        anyhow::ensure!(
            self.chunking.min_chunk_size <= self.chunking.target_chunk_size,
            "min_chunk_size must be <= target_chunk_size"
        );
        anyhow::ensure!(self.search.top_k > 0, "search.top_k must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.search.keyword_weight),
            "search.keyword_weight must be in [0, 1]"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(self.cache_capacity > 0, "cache_capacity must be positive");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
