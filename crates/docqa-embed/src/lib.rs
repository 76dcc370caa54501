//! docqa-embed
//!
//! Local text encoders built on candle: a BERT sentence encoder (mean pooling
//! + L2) for passages and queries, and a BERT cross-encoder for reranking.
//! Deterministic hashing stand-ins are available for tests and offline runs
//! (`models.use_fake` or `APP_USE_FAKE_EMBEDDINGS=1`).

pub mod cross_encoder;
pub mod device;
pub mod pool;
pub mod tokenize;

use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{info, instrument, warn};
use twox_hash::XxHash64;

use docqa_core::config::{expand_path, ModelSettings};
use docqa_core::error::{Error, Result};
use docqa_core::math::check_dimension;
use docqa_core::traits::Embedder;

pub use cross_encoder::{load_cross_encoder, BertCrossEncoder, FakeCrossEncoder};
pub use device::select_device;
pub use pool::masked_mean_l2;

fn inference_err(e: anyhow::Error) -> Error {
    Error::Inference(format!("{e:#}"))
}

fn unavailable_err(e: anyhow::Error) -> Error {
    Error::ModelUnavailable(format!("{e:#}"))
}

/// Reads `model.safetensors`, or `pytorch_model.bin` as a fallback.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return candle_core::safetensors::load(&safetensors, device)
            .with_context(|| format!("reading {}", safetensors.display()));
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle).with_context(|| format!("reading {}", pickle.display()))?;
    Ok(weights.into_iter().collect())
}

pub(crate) fn load_bert_config(model_dir: &Path) -> anyhow::Result<(BertConfig, usize)> {
    let config_path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let hidden_size = value
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))?;
    let config: BertConfig = serde_json::from_value(value)?;
    Ok((config, usize::try_from(hidden_size)?))
}

pub(crate) fn load_tokenizer(model_dir: &Path) -> anyhow::Result<Tokenizer> {
    let tokenizer_path = model_dir.join("tokenizer.json");
    Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))
}

/// Finds a model directory: the configured one first, then `models/<name>` and
/// `../models/<name>` where `<name>` is the last segment of the model id.
pub fn resolve_model_dir(configured: Option<&str>, model_id: &str) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() {
            return Ok(p);
        }
        warn!(dir = %p.display(), "configured model dir does not exist");
    }
    let name = model_id.rsplit('/').next().unwrap_or(model_id);
    for root in ["models", "../models"] {
        let p = Path::new(root).join(name);
        if p.exists() {
            info!(dir = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    Err(Error::ModelUnavailable(format!("no local files for model '{model_id}'")))
}

/// Sentence encoder: BERT hidden states, masked mean pooling, L2 normalization.
pub struct BertEmbedder {
    model: Mutex<BertModel>,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    #[instrument(skip_all, fields(dir = %model_dir.display()))]
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let started = Instant::now();
        let device = select_device();
        let tokenizer = load_tokenizer(model_dir).map_err(unavailable_err)?;
        let (config, dim) = load_bert_config(model_dir).map_err(unavailable_err)?;
        let weights = load_weights(model_dir, &device).map_err(unavailable_err)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config).map_err(|e| Error::ModelUnavailable(e.to_string()))?;
        info!(dim, elapsed_ms = started.elapsed().as_millis() as u64, "encoder loaded");
        Ok(Self { model: Mutex::new(model), tokenizer, device, dim, max_len })
    }

    fn forward(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let inputs = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let model = self.model.lock().map_err(|_| anyhow!("encoder lock poisoned"))?;
        let hidden = model.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
        drop(model);
        let pooled = masked_mean_l2(&hidden, &inputs.attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    #[instrument(skip_all, fields(batch = texts.len()))]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let vectors = self.forward(texts).map_err(inference_err)?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }
}

/// Hashing bag-of-words encoder. Deterministic, unit norm, no model files.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

pub(crate) fn fake_requested(settings: &ModelSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Builds the configured encoder and checks it against `models.dimension`.
pub fn load_embedder(settings: &ModelSettings) -> Result<Arc<dyn Embedder>> {
    if fake_requested(settings) {
        info!(dim = settings.dimension, "using fake encoder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    let dir = resolve_model_dir(settings.embedding_model_dir.as_deref(), &settings.embedding_model)?;
    let embedder = BertEmbedder::load(&dir, settings.max_len)?;
    check_dimension(settings.dimension, embedder.dim())?;
    Ok(Arc::new(embedder))
}
