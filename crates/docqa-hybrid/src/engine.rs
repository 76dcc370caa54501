//! Query API over every retrieval path.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use docqa_core::config::RetrievalSettings;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{CorpusScorer, CrossEncoder, Embedder, PassageStore, Retriever};
use docqa_core::types::{ScoredResult, Strategy};
use docqa_graph::GraphExpander;
use docqa_text::{Bm25Scorer, SynonymExpander};
use docqa_vector::ApproximateIndex;

use crate::dense::DenseRetriever;
use crate::fusion::HybridRetriever;
use crate::rerank::Reranker;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub bm25_weight: f32,
    pub embedding_weight: f32,
    pub graph_threshold: f32,
    pub graph_hops: usize,
    pub rerank_threshold: f32,
    pub rerank_candidates: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for EngineOptions {
    fn from(s: &RetrievalSettings) -> Self {
        Self {
            bm25_weight: s.bm25_weight,
            embedding_weight: s.embedding_weight,
            graph_threshold: s.graph_threshold,
            graph_hops: s.graph_hops,
            rerank_threshold: s.rerank_threshold,
            rerank_candidates: s.rerank_candidates,
        }
    }
}

/// Owns the collaborators and caches behind the query API.
///
/// The approximate index and the similarity graph are built on first use and
/// afterwards only by the explicit `rebuild_*` calls.
pub struct RetrievalEngine {
    store: Arc<dyn PassageStore>,
    dense: Arc<DenseRetriever>,
    lexical: Arc<Bm25Scorer>,
    reranker: Option<Reranker>,
    approximate: Option<Arc<ApproximateIndex>>,
    graph: Arc<GraphExpander>,
    options: EngineOptions,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn PassageStore>, embedder: Arc<dyn Embedder>, options: EngineOptions) -> Self {
        let dense = Arc::new(DenseRetriever::new(store.clone(), embedder.clone()));
        let graph = Arc::new(GraphExpander::new(store.clone(), embedder, options.graph_hops));
        Self {
            store,
            dense,
            lexical: Arc::new(Bm25Scorer::new(None)),
            reranker: None,
            approximate: None,
            graph,
            options,
        }
    }

    pub fn with_cross_encoder(mut self, model: Arc<dyn CrossEncoder>) -> Self {
        self.reranker = Some(Reranker::new(model));
        self
    }

    /// Expands queries for the lexical signal only; dense scoring always sees the original query.
    pub fn with_synonyms(mut self, expander: Arc<SynonymExpander>) -> Self {
        self.lexical = Arc::new(Bm25Scorer::new(Some(expander)));
        self
    }

    pub fn with_approximate_index(mut self, index: Arc<ApproximateIndex>) -> Self {
        self.approximate = Some(index);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn PassageStore> {
        &self.store
    }

    pub fn dense(&self) -> &Arc<DenseRetriever> {
        &self.dense
    }

    fn hybrid(&self) -> HybridRetriever {
        let lexical: Arc<dyn CorpusScorer> = self.lexical.clone();
        HybridRetriever::new(
            self.store.clone(),
            self.dense.clone(),
            lexical,
            self.options.bm25_weight,
            self.options.embedding_weight,
        )
    }

    fn reranker(&self) -> Result<&Reranker> {
        self.reranker
            .as_ref()
            .ok_or_else(|| Error::ModelUnavailable("no cross-encoder configured".to_string()))
    }

    fn approximate(&self) -> Result<&Arc<ApproximateIndex>> {
        self.approximate
            .as_ref()
            .ok_or_else(|| Error::Index("no approximate index configured".to_string()))
    }

    fn candidate_count(&self, top_k: usize) -> usize {
        top_k.max(self.options.rerank_candidates)
    }

    /// Dense retrieval, optionally reranked by the cross-encoder.
    #[instrument(skip(self, query))]
    pub fn retrieve(&self, query: &str, top_k: usize, rerank: bool) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let results = if rerank {
            let reranker = self.reranker()?;
            let candidates = self.dense.retrieve(query, self.candidate_count(top_k))?;
            reranker.rerank(query, candidates, top_k, self.options.rerank_threshold)?
        } else {
            self.dense.retrieve(query, top_k)?
        };
        info!(results = results.len(), elapsed_ms = started.elapsed().as_millis() as u64, "dense retrieval");
        Ok(results)
    }

    #[instrument(skip(self, query))]
    pub fn retrieve_hybrid(&self, query: &str, top_k: usize, bm25_weight: f32, embedding_weight: f32) -> Result<Vec<ScoredResult>> {
        let started = Instant::now();
        let results = self.hybrid().retrieve_weighted(query, top_k, bm25_weight, embedding_weight)?;
        info!(results = results.len(), elapsed_ms = started.elapsed().as_millis() as u64, "hybrid retrieval");
        Ok(results)
    }

    #[instrument(skip(self, query))]
    pub fn retrieve_approximate(&self, query: &str, top_k: usize, rerank: bool) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let index = self.ensure_approximate()?;
        let results = if rerank {
            let reranker = self.reranker()?;
            let candidates = index.search(query, self.candidate_count(top_k))?;
            reranker.rerank(query, candidates, top_k, self.options.rerank_threshold)?
        } else {
            index.search(query, top_k)?
        };
        info!(results = results.len(), elapsed_ms = started.elapsed().as_millis() as u64, "approximate retrieval");
        Ok(results)
    }

    #[instrument(skip(self, query))]
    pub fn retrieve_graph(&self, query: &str, top_k: usize, hops: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        self.ensure_graph()?;
        let results = self.graph.retrieve(query, top_k, hops)?;
        info!(results = results.len(), elapsed_ms = started.elapsed().as_millis() as u64, "graph retrieval");
        Ok(results)
    }

    /// Rebuilds the approximate index from the active corpus; returns its size.
    pub fn rebuild_approximate_index(&self) -> Result<usize> {
        let index = self.approximate()?;
        let corpus = self.store.list_active_passages()?;
        index.build(&corpus)?;
        Ok(corpus.len())
    }

    pub fn rebuild_graph(&self, threshold: f32) -> Result<()> {
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidInput(format!("graph threshold must lie in [-1, 1], got {threshold}")));
        }
        self.graph.rebuild(threshold)
    }

    fn ensure_approximate(&self) -> Result<&Arc<ApproximateIndex>> {
        let index = self.approximate()?;
        if !index.is_built() {
            self.rebuild_approximate_index()?;
        }
        Ok(index)
    }

    fn ensure_graph(&self) -> Result<()> {
        if !self.graph.is_built() {
            self.rebuild_graph(self.options.graph_threshold)?;
        }
        Ok(())
    }

    /// The retriever serving `strategy`, with its cache built if needed.
    pub fn retriever(&self, strategy: Strategy) -> Result<Arc<dyn Retriever>> {
        let retriever: Arc<dyn Retriever> = match strategy {
            Strategy::Dense => self.dense.clone(),
            Strategy::Hybrid => Arc::new(self.hybrid()),
            Strategy::Approximate => self.ensure_approximate()?.clone(),
            Strategy::Graph => {
                self.ensure_graph()?;
                self.graph.clone()
            }
        };
        Ok(retriever)
    }

    pub fn retrieve_with(&self, strategy: Strategy, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.retriever(strategy)?.retrieve(query, top_k)
    }
}
