use std::sync::Arc;

use docqa_core::error::{Error, Result};
use docqa_core::store::MemoryPassageStore;
use docqa_core::traits::{CorpusScorer, CrossEncoder, Embedder, PassageStore, PassageWriter};
use docqa_core::types::{NewDocument, NewPassage, ScoredResult, Strategy};
use docqa_embed::FakeCrossEncoder;
use docqa_hybrid::{DenseRetriever, EngineOptions, Reranker, RetrievalEngine, WeightedFusion};
use docqa_text::Bm25Scorer;

/// Every text embeds to the x axis.
struct AxisEmbedder;

impl Embedder for AxisEmbedder {
    fn dim(&self) -> usize {
        2
    }
    fn max_len(&self) -> usize {
        512
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn dim(&self) -> usize {
        2
    }
    fn max_len(&self) -> usize {
        512
    }
    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::ModelUnavailable("encoder offline".to_string()))
    }
}

/// Scores a pair by the passage length, so longer passages rank first.
struct LengthCrossEncoder;

impl CrossEncoder for LengthCrossEncoder {
    fn score_pairs(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        Ok(passages.iter().map(|p| p.len() as f32).collect())
    }
}

fn unit_at(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt()]
}

/// Three passages whose cosine to the query is 0.9, 0.5 and 0.1.
fn scenario_store() -> Arc<MemoryPassageStore> {
    let store = Arc::new(MemoryPassageStore::new());
    let doc = store
        .create_document(NewDocument {
            filename: "guide.txt".to_string(),
            display_name: "guide".to_string(),
            content_hash: "guide".to_string(),
            raw_content: String::new(),
            is_active: true,
        })
        .unwrap();
    let passages = [("first passage about wells", 0.9), ("second one", 0.5), ("third", 0.1)]
        .into_iter()
        .map(|(text, cos)| NewPassage { content: text.to_string(), content_hash: text.to_string(), embedding: unit_at(cos) })
        .collect();
    store.insert_passages(doc.id, passages).unwrap();
    store
}

fn engine(store: Arc<MemoryPassageStore>) -> RetrievalEngine {
    RetrievalEngine::new(store, Arc::new(AxisEmbedder), EngineOptions::default())
}

fn cosines(results: &[ScoredResult]) -> Vec<f32> {
    results.iter().map(|r| (r.cosine_similarity * 100.0).round() / 100.0).collect()
}

#[test]
fn dense_top_two_follow_similarity() {
    let results = engine(scenario_store()).retrieve("anything", 2, false).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content, "first passage about wells");
    assert_eq!(results[1].content, "second one");
    assert_eq!(cosines(&results), vec![0.9, 0.5]);
    assert_eq!(results[0].source_document_name, "guide");
    assert!(results.iter().all(|r| r.rerank_score.is_none()));
}

#[test]
fn fetch_scores_every_passage_within_range() {
    let store = scenario_store();
    let dense = DenseRetriever::new(store.clone(), Arc::new(AxisEmbedder));
    let corpus = store.list_active_passages().unwrap();
    let results = dense.fetch("q", &corpus).unwrap();
    assert_eq!(results.len(), corpus.len());
    assert!(results.iter().all(|r| (-1.0 - 1e-6..=1.0 + 1e-6).contains(&r.cosine_similarity)));
    assert!(dense.fetch("q", &[]).unwrap().is_empty());
}

#[test]
fn zero_top_k_is_empty_on_every_path() {
    let engine = engine(scenario_store()).with_cross_encoder(Arc::new(FakeCrossEncoder));
    assert!(engine.retrieve("q", 0, false).unwrap().is_empty());
    assert!(engine.retrieve("q", 0, true).unwrap().is_empty());
    assert!(engine.retrieve_hybrid("q", 0, 0.2, 0.8).unwrap().is_empty());
    assert!(engine.retrieve_graph("q", 0, 1).unwrap().is_empty());
    assert!(engine.retrieve_with(Strategy::Dense, "q", 0).unwrap().is_empty());
}

#[test]
fn empty_corpus_is_not_an_error() {
    let engine = engine(Arc::new(MemoryPassageStore::new()));
    assert!(engine.retrieve("q", 5, false).unwrap().is_empty());
    assert!(engine.retrieve_hybrid("q", 5, 0.2, 0.8).unwrap().is_empty());
    assert!(engine.retrieve_graph("q", 5, 2).unwrap().is_empty());
}

#[test]
fn rerank_threshold_above_all_scores_yields_nothing() {
    let store = scenario_store();
    let candidates = DenseRetriever::new(store, Arc::new(AxisEmbedder)).retrieve("q", 3).unwrap();
    let reranker = Reranker::new(Arc::new(LengthCrossEncoder));
    assert!(reranker.rerank("q", candidates, 3, 1_000.0).unwrap().is_empty());
}

#[test]
fn rerank_reorders_and_truncates() {
    let options = EngineOptions { rerank_threshold: 6.0, ..EngineOptions::default() };
    let engine = RetrievalEngine::new(scenario_store(), Arc::new(AxisEmbedder), options)
        .with_cross_encoder(Arc::new(LengthCrossEncoder));
    let results = engine.retrieve("q", 2, true).unwrap();
    // "third" (length 5) falls under the threshold
    let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["first passage about wells", "second one"]);
    assert_eq!(results[0].rerank_score, Some(25.0));
}

#[test]
fn rerank_without_cross_encoder_is_model_unavailable() {
    match engine(scenario_store()).retrieve("q", 2, true) {
        Err(Error::ModelUnavailable(_)) => {}
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn encoder_failure_is_an_error_not_an_empty_list() {
    let engine = RetrievalEngine::new(scenario_store(), Arc::new(BrokenEmbedder), EngineOptions::default());
    assert!(engine.retrieve("q", 3, false).is_err());
    assert!(engine.retrieve_hybrid("q", 3, 0.2, 0.8).is_err());
}

#[test]
fn hybrid_lexical_weight_can_override_dense_order() {
    let engine = engine(scenario_store());
    let results = engine.retrieve_hybrid("third", 3, 1.0, 0.0).unwrap();
    assert_eq!(results[0].content, "third");
    assert_eq!(results[0].fused_score, Some(1.0));

    let dense_only = engine.retrieve_hybrid("third", 3, 0.0, 1.0).unwrap();
    assert_eq!(dense_only[0].content, "first passage about wells");
}

#[test]
fn weighted_fusion_composes_scorers() {
    let store = scenario_store();
    let corpus = store.list_active_passages().unwrap();
    let dense: Arc<dyn CorpusScorer> = Arc::new(DenseRetriever::new(store, Arc::new(AxisEmbedder)));
    let lexical: Arc<dyn CorpusScorer> = Arc::new(Bm25Scorer::new(None));

    let fusion = WeightedFusion::new().with(dense, 0.5).with(lexical, 0.5);
    assert_eq!(fusion.len(), 2);
    let fused = fusion.fuse("third", &corpus).unwrap();
    assert_eq!(fused.len(), 3);
    // passage 1 wins dense, passage 3 wins lexical
    assert!((fused[0] - 0.5).abs() < 1e-5);
    assert!((fused[2] - 0.5).abs() < 1e-5);
    assert!(fused[1] < 0.5);

    assert_eq!(WeightedFusion::new().fuse("q", &corpus).unwrap(), vec![0.0; 3]);
}

#[test]
fn strategies_dispatch_through_retriever() {
    let engine = engine(scenario_store());
    for strategy in [Strategy::Dense, Strategy::Hybrid, Strategy::Graph] {
        let results = engine.retrieve_with(strategy, "wells", 1).unwrap();
        assert_eq!(results.len(), 1, "{strategy}");
    }
    assert!(matches!(engine.retrieve_with(Strategy::Approximate, "q", 1), Err(Error::Index(_))));
}

#[test]
fn graph_threshold_is_validated() {
    let engine = engine(scenario_store());
    assert!(engine.rebuild_graph(1.5).is_err());
    engine.rebuild_graph(0.8).unwrap();
    let results = engine.retrieve_graph("q", 2, 1).unwrap();
    assert_eq!(cosines(&results), vec![0.9, 0.5]);
}
