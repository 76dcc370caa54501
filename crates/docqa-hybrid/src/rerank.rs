use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use docqa_core::error::{Error, Result};
use docqa_core::ranking::top_k_by;
use docqa_core::traits::CrossEncoder;
use docqa_core::types::ScoredResult;

/// Final-stage filter and sort by cross-encoder score.
#[derive(Clone)]
pub struct Reranker {
    model: Arc<dyn CrossEncoder>,
}

impl Reranker {
    pub fn new(model: Arc<dyn CrossEncoder>) -> Self {
        Self { model }
    }

    /// Scores every `(query, content)` pair, drops results below `threshold`,
    /// then keeps the best `top_k`. An empty result is a valid outcome.
    #[instrument(skip(self, query, results), fields(candidates = results.len()))]
    pub fn rerank(&self, query: &str, results: Vec<ScoredResult>, top_k: usize, threshold: f32) -> Result<Vec<ScoredResult>> {
        if results.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        let scores = self.model.score_pairs(query, &contents)?;
        if scores.len() != results.len() {
            return Err(Error::Inference(format!(
                "cross-encoder returned {} scores for {} pairs",
                scores.len(),
                results.len()
            )));
        }
        let kept: Vec<ScoredResult> = results
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= threshold)
            .map(|(mut r, score)| {
                r.rerank_score = Some(score);
                r
            })
            .collect();
        debug!(kept = kept.len(), elapsed_ms = started.elapsed().as_millis() as u64, "reranked");
        Ok(top_k_by(kept, top_k, |r| r.rerank_score.unwrap_or(f32::NEG_INFINITY)))
    }
}
