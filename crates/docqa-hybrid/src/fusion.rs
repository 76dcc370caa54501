//! Min-max normalization and weighted linear fusion of score vectors.
//!
//! A constant score vector normalizes to all zeros, so that signal adds
//! nothing to the fused score. This is kept as-is.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use docqa_core::error::{Error, Result};
use docqa_core::ranking::top_k_by;
use docqa_core::traits::{CorpusScorer, PassageStore, Retriever};
use docqa_core::types::{Passage, ScoredResult};

use crate::dense::DenseRetriever;

/// Scales `scores` to `[0, 1]`; a constant vector becomes all zeros.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range > 0.0 && range.is_finite() {
        scores.iter().map(|s| (s - min) / range).collect()
    } else {
        scores.iter().map(|s| s - min).map(|s| if s.is_finite() { s } else { 0.0 }).collect()
    }
}

fn weighted_sum(signals: &[(&[f32], f32)]) -> Result<Vec<f32>> {
    let len = signals.first().map_or(0, |(s, _)| s.len());
    if let Some((s, _)) = signals.iter().find(|(s, _)| s.len() != len) {
        return Err(Error::InvalidInput(format!("score vectors differ in length: {} vs {}", len, s.len())));
    }
    let mut fused = vec![0.0f32; len];
    for (scores, weight) in signals {
        for (out, s) in fused.iter_mut().zip(min_max_normalize(scores)) {
            *out += weight * s;
        }
    }
    Ok(fused)
}

/// `bm25_weight * norm(bm25) + dense_weight * norm(dense)`, index-aligned.
pub fn combine(bm25_scores: &[f32], dense_scores: &[f32], bm25_weight: f32, dense_weight: f32) -> Result<Vec<f32>> {
    weighted_sum(&[(bm25_scores, bm25_weight), (dense_scores, dense_weight)])
}

/// Fuses any set of corpus scorers with per-scorer weights.
#[derive(Clone, Default)]
pub struct WeightedFusion {
    sources: Vec<(Arc<dyn CorpusScorer>, f32)>,
}

impl WeightedFusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scorer: Arc<dyn CorpusScorer>, weight: f32) -> Self {
        self.sources.push((scorer, weight));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn fuse(&self, query: &str, corpus: &[Passage]) -> Result<Vec<f32>> {
        let mut scored = Vec::with_capacity(self.sources.len());
        for (scorer, weight) in &self.sources {
            let scores = scorer.score_corpus(query, corpus)?;
            if scores.len() != corpus.len() {
                return Err(Error::InvalidInput(format!(
                    "scorer returned {} scores for {} passages",
                    scores.len(),
                    corpus.len()
                )));
            }
            scored.push((scores, *weight));
        }
        if scored.is_empty() {
            return Ok(vec![0.0; corpus.len()]);
        }
        let signals: Vec<(&[f32], f32)> = scored.iter().map(|(s, w)| (s.as_slice(), *w)).collect();
        weighted_sum(&signals)
    }
}

/// Dense and lexical signals fused over the active corpus.
pub struct HybridRetriever {
    store: Arc<dyn PassageStore>,
    dense: Arc<DenseRetriever>,
    lexical: Arc<dyn CorpusScorer>,
    bm25_weight: f32,
    embedding_weight: f32,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn PassageStore>,
        dense: Arc<DenseRetriever>,
        lexical: Arc<dyn CorpusScorer>,
        bm25_weight: f32,
        embedding_weight: f32,
    ) -> Self {
        Self { store, dense, lexical, bm25_weight, embedding_weight }
    }

    /// Results carry the raw cosine plus the fused score they are ranked by.
    #[instrument(skip(self, query))]
    pub fn retrieve_weighted(&self, query: &str, top_k: usize, bm25_weight: f32, embedding_weight: f32) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let corpus = self.store.list_active_passages()?;
        if corpus.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let mut results = self.dense.fetch(query, &corpus)?;
        let lexical = self.lexical.score_corpus(query, &corpus)?;
        let dense: Vec<f32> = results.iter().map(|r| r.cosine_similarity).collect();
        let fused = combine(&lexical, &dense, bm25_weight, embedding_weight)?;
        for (r, f) in results.iter_mut().zip(fused) {
            r.fused_score = Some(f);
        }
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "hybrid fusion");
        Ok(top_k_by(results, top_k, |r| r.fused_score.unwrap_or(0.0)))
    }
}

impl Retriever for HybridRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        self.retrieve_weighted(query, top_k, self.bm25_weight, self.embedding_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_spans_unit_interval() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn constant_vector_contributes_nothing() {
        assert_eq!(min_max_normalize(&[0.7, 0.7]), vec![0.0, 0.0]);
        let fused = combine(&[0.0, 0.0, 0.0], &[0.1, 0.9, 0.5], 0.2, 0.8).unwrap();
        assert_eq!(fused.len(), 3);
        assert!((fused[1] - 0.8).abs() < 1e-6);
        assert!(fused[0].abs() < 1e-6);
    }

    #[test]
    fn fused_scores_stay_within_weight_bound() {
        let bm25 = [3.1, 0.0, 7.4, 1.2];
        let dense = [0.2, -0.4, 0.9, 0.95];
        let fused = combine(&bm25, &dense, 0.2, 0.8).unwrap();
        assert_eq!(fused.len(), bm25.len());
        assert!(fused.iter().all(|f| *f >= 0.0 && *f <= 1.0 + 1e-6));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(combine(&[1.0], &[1.0, 2.0], 0.5, 0.5).is_err());
    }

    #[test]
    fn empty_inputs_fuse_to_empty() {
        assert!(combine(&[], &[], 0.2, 0.8).unwrap().is_empty());
    }
}
