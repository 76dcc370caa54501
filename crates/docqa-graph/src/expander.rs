use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, info, instrument};

use docqa_core::error::{Error, Result};
use docqa_core::math::{check_dimension, cosine_similarity};
use docqa_core::ranking::top_k_by;
use docqa_core::traits::{Embedder, PassageStore, Retriever};
use docqa_core::types::{Passage, PassageId, ScoredResult};

use crate::graph::SimilarityGraph;

/// Dense seeds expanded through the similarity graph.
///
/// The graph is an owned cache: [`GraphExpander::build`] constructs a new graph
/// aside and swaps it in, so concurrent retrievals keep using the previous one
/// until the swap. Nothing rebuilds it automatically when the corpus changes.
/// Before the first build, retrieval returns the dense seeds unexpanded.
pub struct GraphExpander {
    store: Arc<dyn PassageStore>,
    embedder: Arc<dyn Embedder>,
    graph: RwLock<Option<Arc<SimilarityGraph>>>,
    hops: usize,
}

impl GraphExpander {
    pub fn new(store: Arc<dyn PassageStore>, embedder: Arc<dyn Embedder>, hops: usize) -> Self {
        Self { store, embedder, graph: RwLock::new(None), hops }
    }

    pub fn graph(&self) -> Result<Option<Arc<SimilarityGraph>>> {
        self.graph
            .read()
            .map(|g| g.clone())
            .map_err(|_| Error::Index("graph lock poisoned".to_string()))
    }

    pub fn is_built(&self) -> bool {
        matches!(self.graph(), Ok(Some(_)))
    }

    pub fn hops(&self) -> usize {
        self.hops
    }

    #[instrument(skip(self, corpus), fields(corpus = corpus.len()))]
    pub fn build(&self, corpus: &[Passage], threshold: f32) -> Result<()> {
        let next = Arc::new(SimilarityGraph::build(corpus, threshold)?);
        info!(nodes = next.node_count(), edges = next.edge_count(), "similarity graph published");
        *self.graph.write().map_err(|_| Error::Index("graph lock poisoned".to_string()))? = Some(next);
        Ok(())
    }

    /// Builds over the store's current active passages.
    pub fn rebuild(&self, threshold: f32) -> Result<()> {
        let corpus = self.store.list_active_passages()?;
        self.build(&corpus, threshold)
    }

    /// Top-k dense seeds, `hops` rounds of neighbour expansion, then the union
    /// is re-scored against the query and cut to `top_k`.
    ///
    /// Candidates that are no longer active passages are dropped.
    #[instrument(skip(self, query))]
    pub fn retrieve(&self, query: &str, top_k: usize, hops: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let corpus = self.store.list_active_passages()?;
        if corpus.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let query_vec = self.embedder.embed(query)?;
        check_dimension(self.embedder.dim(), query_vec.len())?;
        for p in &corpus {
            check_dimension(query_vec.len(), p.embedding.len())?;
        }

        let by_id: HashMap<PassageId, &Passage> = corpus.iter().map(|p| (p.id, p)).collect();
        let scored: Vec<ScoredResult> = corpus
            .iter()
            .map(|p| ScoredResult::from_passage(p, cosine_similarity(&query_vec, &p.embedding)))
            .collect();
        let seeds: Vec<PassageId> = top_k_by(scored, top_k, |r| r.cosine_similarity)
            .into_iter()
            .map(|r| r.passage_id)
            .collect();

        let candidates: BTreeSet<PassageId> = match self.graph()? {
            Some(graph) => graph.expand(&seeds, hops),
            None => seeds.iter().copied().collect(),
        };
        let rescored: Vec<ScoredResult> = candidates
            .iter()
            .filter_map(|id| by_id.get(id))
            .map(|p| ScoredResult::from_passage(p, cosine_similarity(&query_vec, &p.embedding)))
            .collect();
        debug!(
            seeds = seeds.len(),
            candidates = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graph expansion"
        );
        Ok(top_k_by(rescored, top_k, |r| r.cosine_similarity))
    }
}

impl Retriever for GraphExpander {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        GraphExpander::retrieve(self, query, top_k, self.hops)
    }
}
