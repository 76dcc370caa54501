use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use docqa_core::error::Result;
use docqa_core::math::{check_dimension, cosine_similarity};
use docqa_core::ranking::top_k_by;
use docqa_core::traits::{CorpusScorer, Embedder, PassageStore, Retriever};
use docqa_core::types::{Passage, ScoredResult};

/// Exhaustive cosine scoring of a query against stored passage embeddings.
pub struct DenseRetriever {
    store: Arc<dyn PassageStore>,
    embedder: Arc<dyn Embedder>,
}

impl DenseRetriever {
    pub fn new(store: Arc<dyn PassageStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let v = self.embedder.embed(query)?;
        check_dimension(self.embedder.dim(), v.len())?;
        Ok(v)
    }

    /// One unsorted result per passage in `corpus`.
    #[instrument(skip_all, fields(corpus = corpus.len()))]
    pub fn fetch(&self, query: &str, corpus: &[Passage]) -> Result<Vec<ScoredResult>> {
        if corpus.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let query_vec = self.embed_query(query)?;
        let mut results = Vec::with_capacity(corpus.len());
        for passage in corpus {
            check_dimension(query_vec.len(), passage.embedding.len())?;
            results.push(ScoredResult::from_passage(passage, cosine_similarity(&query_vec, &passage.embedding)));
        }
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "dense scoring");
        Ok(results)
    }

    /// [`DenseRetriever::fetch`] over every active passage.
    pub fn fetch_active(&self, query: &str) -> Result<Vec<ScoredResult>> {
        let corpus = self.store.list_active_passages()?;
        self.fetch(query, &corpus)
    }

    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        Ok(top_k_by(self.fetch_active(query)?, top_k, |r| r.cosine_similarity))
    }
}

impl Retriever for DenseRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        DenseRetriever::retrieve(self, query, top_k)
    }
}

impl CorpusScorer for DenseRetriever {
    fn score_corpus(&self, query: &str, corpus: &[Passage]) -> Result<Vec<f32>> {
        Ok(self.fetch(query, corpus)?.into_iter().map(|r| r.cosine_similarity).collect())
    }
}
