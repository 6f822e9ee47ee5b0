//! TOML configuration.
//!
//! Only `[db].path` is mandatory; every other section and field falls back
//! to the defaults below. API keys never live in the file: providers read
//! them from the environment variable named by `api_key_env`.
//!
//! ```toml
//! [db]
//! path = "./data/sahayak.sqlite"
//!
//! [knowledge]
//! root = "./data/knowledge"
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [retrieval]
//! top_k = 5
//! min_similarity = 0.2
//!
//! [generation]
//! model = "llama-3.1-8b-instant"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retriever::MAX_TOP_K;
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// All defaults, persisting to `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            knowledge: KnowledgeConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k == 0 || self.retrieval.top_k > MAX_TOP_K {
            bail!("retrieval.top_k must be in 1..={}", MAX_TOP_K);
        }
        if self.retrieval.oversample_factor == 0 {
            bail!("retrieval.oversample_factor must be >= 1");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_similarity) {
            bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
        }

        if self.context.max_context_tokens == 0 {
            bail!("context.max_context_tokens must be > 0");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.max_attempts == 0 {
            bail!("embedding.max_attempts must be >= 1");
        }
        match self.embedding.provider.as_str() {
            "hash" => {
                if self.embedding.dims == Some(0) {
                    bail!("embedding.dims must be > 0");
                }
            }
            "openai" | "local" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.provider == "openai"
                    && (self.embedding.dims.is_none() || self.embedding.dims == Some(0))
                {
                    bail!("embedding.dims must be > 0 when provider is 'openai'");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hash, openai, or local.",
                other
            ),
        }

        if self.generation.max_attempts == 0 {
            bail!("generation.max_attempts must be >= 1");
        }
        match self.generation.provider.as_str() {
            "openai" | "disabled" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be openai or disabled.",
                other
            ),
        }
        if self.generation.no_context_message.trim().is_empty()
            || self.generation.unavailable_message.trim().is_empty()
        {
            bail!("generation fallback messages must not be empty");
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The designated knowledge folder scanned by `sahayak ingest`.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root: default_knowledge_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_knowledge_root() -> PathBuf {
    PathBuf::from("./data/knowledge")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}

/// Character-window chunking policy.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of an OpenAI-compatible API (e.g. `http://localhost:11434/v1` for Ollama).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            base_url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            max_attempts: default_embedding_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_attempts() -> u32 {
    4
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_timeout_secs() -> u64 {
    30
}

/// What `retrieve` does when the index holds zero chunks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyIndexPolicy {
    /// Return an empty result.
    #[default]
    Empty,
    /// Raise [`RagError::EmptyKnowledgeBase`](crate::error::RagError::EmptyKnowledgeBase).
    Error,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,
    #[serde(default)]
    pub one_chunk_per_document: bool,
    #[serde(default)]
    pub empty_index_policy: EmptyIndexPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            oversample_factor: default_oversample_factor(),
            one_chunk_per_document: false,
            empty_index_policy: EmptyIndexPolicy::Empty,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_similarity() -> f32 {
    0.2
}
fn default_oversample_factor() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

fn default_max_context_tokens() -> usize {
    1500
}

/// What the orchestrator does when retrieval produced no context.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Answer with `no_context_message` without calling the generator.
    #[default]
    Fallback,
    /// Call the generator with the bare question and an instruction to
    /// admit that no reference material was found.
    GenerateWithoutContext,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub on_empty_context: EmptyContextPolicy,
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
    #[serde(default = "default_no_context_message")]
    pub no_context_message: String,
    #[serde(default = "default_unavailable_message")]
    pub unavailable_message: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            api_key_env: default_generation_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_generation_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            on_empty_context: EmptyContextPolicy::Fallback,
            include_sources: default_include_sources(),
            no_context_message: default_no_context_message(),
            unavailable_message: default_unavailable_message(),
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_generation_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_generation_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    400
}
fn default_temperature() -> f32 {
    0.3
}
fn default_generation_attempts() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_include_sources() -> bool {
    true
}
fn default_no_context_message() -> String {
    "I don't have enough information to answer this question.".to_string()
}
fn default_unavailable_message() -> String {
    "Sorry, I could not retrieve a grounded answer right now. Please try again later.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
