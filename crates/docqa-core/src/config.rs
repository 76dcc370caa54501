//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_RETRIEVAL__BM25_WEIGHT=0.5`). Values are fixed for the process lifetime.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunking::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::Strategy;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_in(Path::new("."), &env_name)
    }

    /// Loads the config files found in `dir` for the given environment name.
    pub fn load_in(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub models: ModelSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub embedding_model: String,
    pub embedding_model_dir: Option<String>,
    pub cross_encoder_model: String,
    pub cross_encoder_model_dir: Option<String>,
    pub dimension: usize,
    pub max_len: usize,
    /// Use the deterministic hashing encoder instead of loading weights.
    pub use_fake: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            embedding_model: "intfloat/multilingual-e5-small".to_string(),
            embedding_model_dir: None,
            cross_encoder_model: "cross-encoder/ms-marco-TinyBERT-L-2-v2".to_string(),
            cross_encoder_model_dir: None,
            dimension: 384,
            max_len: 512,
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub bm25_weight: f32,
    pub embedding_weight: f32,
    pub graph_threshold: f32,
    pub graph_hops: usize,
    pub rerank_threshold: f32,
    /// Dense candidates gathered before reranking.
    pub rerank_candidates: usize,
    pub default_top_k: usize,
    pub strategy: Strategy,
    pub language: String,
    pub synonyms_path: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            bm25_weight: 0.2,
            embedding_weight: 0.8,
            graph_threshold: 0.8,
            graph_hops: 1,
            rerank_threshold: -5.0,
            rerank_candidates: 20,
            default_top_k: 5,
            strategy: Strategy::Dense,
            language: "por".to_string(),
            synonyms_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub raw_txt_dir: String,
    pub store_path: String,
    pub lancedb_dir: String,
    pub index_table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            raw_txt_dir: "data".to_string(),
            store_path: "data/store.json".to_string(),
            lancedb_dir: "data/indexes/lancedb".to_string(),
            index_table: "passages".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::load()?.settings()
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if self.models.dimension == 0 {
            return Err(Error::InvalidConfig("models.dimension must be > 0".to_string()));
        }
        if self.models.max_len == 0 {
            return Err(Error::InvalidConfig("models.max_len must be > 0".to_string()));
        }
        if self.chunking.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".to_string()));
        }
        for (name, w) in [("retrieval.bm25_weight", r.bm25_weight), ("retrieval.embedding_weight", r.embedding_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be a finite non-negative number, got {w}")));
            }
        }
        if !(-1.0..=1.0).contains(&r.graph_threshold) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.graph_threshold must lie in [-1, 1], got {}",
                r.graph_threshold
            )));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
