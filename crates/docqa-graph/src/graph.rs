use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use petgraph::graph::{Graph, NodeIndex};
use petgraph::Undirected;
use tracing::{debug, warn};

use docqa_core::error::Result;
use docqa_core::math::{check_dimension, cosine_similarity};
use docqa_core::types::{DocumentId, Passage, PassageId};

#[derive(Debug, Clone)]
pub struct PassageNode {
    pub passage_id: PassageId,
    pub document_id: DocumentId,
    pub document_name: String,
    pub content: String,
}

/// Undirected graph over passages; an edge joins every pair whose cosine
/// similarity reaches the build threshold and carries that similarity.
#[derive(Debug, Default)]
pub struct SimilarityGraph {
    graph: Graph<PassageNode, f32, Undirected>,
    nodes: HashMap<PassageId, NodeIndex>,
    threshold: f32,
}

impl SimilarityGraph {
    /// Fails with `DimensionMismatch` unless every embedding has the length of the first.
    pub fn build(corpus: &[Passage], threshold: f32) -> Result<Self> {
        let started = Instant::now();
        let mut graph = Graph::new_undirected();
        let mut nodes = HashMap::with_capacity(corpus.len());
        let Some(first) = corpus.first() else {
            warn!("similarity graph requested for an empty corpus");
            return Ok(Self { graph, nodes, threshold });
        };
        for p in corpus {
            check_dimension(first.embedding.len(), p.embedding.len())?;
        }
        let indices: Vec<NodeIndex> = corpus
            .iter()
            .map(|p| {
                let idx = graph.add_node(PassageNode {
                    passage_id: p.id,
                    document_id: p.document_id,
                    document_name: p.document_name.clone(),
                    content: p.content.clone(),
                });
                nodes.insert(p.id, idx);
                idx
            })
            .collect();

        for i in 0..corpus.len() {
            for j in (i + 1)..corpus.len() {
                let similarity = cosine_similarity(&corpus[i].embedding, &corpus[j].embedding);
                if similarity >= threshold {
                    graph.add_edge(indices[i], indices[j], similarity);
                }
            }
        }
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "similarity graph built"
        );
        Ok(Self { graph, nodes, threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: PassageId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: PassageId) -> Option<&PassageNode> {
        self.nodes.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn edge_weight(&self, a: PassageId, b: PassageId) -> Option<f32> {
        let (a, b) = (self.nodes.get(&a)?, self.nodes.get(&b)?);
        self.graph.find_edge(*a, *b).map(|e| self.graph[e])
    }

    /// Seeds plus everything reachable within `hops` edges. Seeds missing from
    /// the graph stay in the result but contribute no neighbours.
    pub fn expand(&self, seeds: &[PassageId], hops: usize) -> BTreeSet<PassageId> {
        let mut visited: BTreeSet<PassageId> = seeds.iter().copied().collect();
        let mut frontier: Vec<NodeIndex> = seeds.iter().filter_map(|id| self.nodes.get(id).copied()).collect();
        for _ in 0..hops {
            let mut next = Vec::new();
            for idx in frontier {
                for neighbour in self.graph.neighbors(idx) {
                    if visited.insert(self.graph[neighbour].passage_id) {
                        next.push(neighbour);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited
    }
}
