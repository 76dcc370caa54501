use anyhow::anyhow;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use candle_core::{DType, Device, IndexOp};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::BertModel;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument};

use docqa_core::config::ModelSettings;
use docqa_core::error::{Error, Result};
use docqa_core::traits::CrossEncoder;

use crate::{fake_requested, load_bert_config, load_tokenizer, load_weights, resolve_model_dir, select_device, tokenize};

struct CrossEncoderHead {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
}

/// Sequence-classification BERT: `[CLS]` state, tanh pooler, single-logit classifier.
pub struct BertCrossEncoder {
    head: Mutex<CrossEncoderHead>,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl BertCrossEncoder {
    #[instrument(skip_all, fields(dir = %model_dir.display()))]
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let started = Instant::now();
        let unavailable = |e: anyhow::Error| Error::ModelUnavailable(format!("{e:#}"));
        let device = select_device();
        let tokenizer = load_tokenizer(model_dir).map_err(unavailable)?;
        let (config, hidden) = load_bert_config(model_dir).map_err(unavailable)?;
        let weights = load_weights(model_dir, &device).map_err(unavailable)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let candle_err = |e: candle_core::Error| Error::ModelUnavailable(e.to_string());
        let bert = BertModel::load(vb.pp("bert"), &config).map_err(candle_err)?;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense")).map_err(candle_err)?;
        let classifier = candle_nn::linear(hidden, 1, vb.pp("classifier")).map_err(candle_err)?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "cross-encoder loaded");
        Ok(Self { head: Mutex::new(CrossEncoderHead { bert, pooler, classifier }), tokenizer, device, max_len })
    }

    fn logits(&self, query: &str, passages: &[&str]) -> anyhow::Result<Vec<f32>> {
        let inputs = tokenize::tokenize_pairs(&self.tokenizer, query, passages, self.max_len, &self.device)?;
        let head = self.head.lock().map_err(|_| anyhow!("cross-encoder lock poisoned"))?;
        let hidden = head.bert.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = head.pooler.forward(&cls)?.tanh()?;
        let logits = head.classifier.forward(&pooled)?.squeeze(1)?;
        Ok(logits.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

impl CrossEncoder for BertCrossEncoder {
    #[instrument(skip_all, fields(pairs = passages.len()))]
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let scores = self.logits(query, passages).map_err(|e| Error::Inference(format!("{e:#}")))?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "scored pairs");
        Ok(scores)
    }
}

/// Scores a pair by the number of distinct query words found in the passage.
#[derive(Debug, Clone, Default)]
pub struct FakeCrossEncoder;

impl CrossEncoder for FakeCrossEncoder {
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let query_words: HashSet<String> = query.split_whitespace().map(str::to_lowercase).collect();
        Ok(passages
            .iter()
            .map(|p| {
                let words: HashSet<String> = p.split_whitespace().map(str::to_lowercase).collect();
                query_words.intersection(&words).count() as f32
            })
            .collect())
    }
}

pub fn load_cross_encoder(settings: &ModelSettings) -> Result<Arc<dyn CrossEncoder>> {
    if fake_requested(settings) {
        info!("using fake cross-encoder");
        return Ok(Arc::new(FakeCrossEncoder));
    }
    let dir = resolve_model_dir(settings.cross_encoder_model_dir.as_deref(), &settings.cross_encoder_model)?;
    Ok(Arc::new(BertCrossEncoder::load(&dir, settings.max_len)?))
}
