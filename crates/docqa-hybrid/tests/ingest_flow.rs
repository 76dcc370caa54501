use std::sync::Arc;

use docqa_core::chunking::{Chunker, ChunkingConfig};
use docqa_core::error::Error;
use docqa_core::store::MemoryPassageStore;
use docqa_core::traits::{PassageStore, PassageWriter};
use docqa_core::types::Strategy;
use docqa_embed::{FakeCrossEncoder, FakeEmbedder};
use docqa_hybrid::{EngineOptions, Ingestor, RetrievalEngine};
use docqa_vector::ApproximateIndex;

const DIM: usize = 64;

fn ingestor(store: Arc<MemoryPassageStore>) -> Ingestor {
    let chunker = Chunker::new(ChunkingConfig { chunk_size: 512, min_chars_per_chunk: 1, overlap_percent: 0.2 });
    Ingestor::new(store, Arc::new(FakeEmbedder::new(DIM)), chunker)
}

const WATER: &str = "rainwater tanks need a first flush diverter\n\ncheck the gutter screens every autumn";
const GARDEN: &str = "tomatoes want deep watering twice a week\n\nmulch keeps the soil moist";

#[test]
fn identical_document_is_stored_once() {
    let store = Arc::new(MemoryPassageStore::new());
    let ingest = ingestor(store.clone());

    let first = ingest.add_document("water.txt", "water", WATER).unwrap();
    assert!(!first.duplicate);
    assert_eq!(first.passages.len(), 2);

    let again = ingest.add_document("water-copy.txt", "water copy", WATER).unwrap();
    assert!(again.duplicate);
    assert_eq!(again.document.id, first.document.id);
    assert!(again.passages.is_empty());
    assert_eq!(store.list_documents().unwrap().len(), 1);
}

#[test]
fn shared_chunks_are_not_duplicated_across_documents() {
    let store = Arc::new(MemoryPassageStore::new());
    let ingest = ingestor(store.clone());
    ingest.add_document("water.txt", "water", WATER).unwrap();

    let overlapping = format!("{GARDEN}\n\ncheck the gutter screens every autumn");
    let outcome = ingest.add_document("garden.txt", "garden", &overlapping).unwrap();
    assert_eq!(outcome.passages.len(), 2);
    assert_eq!(store.list_active_passages().unwrap().len(), 4);
}

#[test]
fn ingest_into_unknown_document_is_not_found() {
    let ingest = ingestor(Arc::new(MemoryPassageStore::new()));
    assert!(matches!(ingest.ingest(42, "text"), Err(Error::NotFound(_))));
    assert!(matches!(ingest.replace(42, "text"), Err(Error::NotFound(_))));
}

#[test]
fn replace_regenerates_document_passages() {
    let store = Arc::new(MemoryPassageStore::new());
    let ingest = ingestor(store.clone());
    let doc = ingest.add_document("water.txt", "water", WATER).unwrap().document;

    let ids = ingest
        .replace(doc.id, "rainwater tanks need a first flush diverter\n\nclean the tank once a year")
        .unwrap();
    assert_eq!(ids.len(), 2);
    let contents: Vec<String> = store.list_document_passages(doc.id).unwrap().into_iter().map(|p| p.content).collect();
    assert!(contents.contains(&"clean the tank once a year".to_string()));
    assert!(!contents.contains(&"check the gutter screens every autumn".to_string()));
}

#[test]
fn ingested_passages_are_retrievable() {
    let store = Arc::new(MemoryPassageStore::new());
    let ingest = ingestor(store.clone());
    ingest.add_document("water.txt", "water", WATER).unwrap();
    ingest.add_document("garden.txt", "garden", GARDEN).unwrap();

    let engine = RetrievalEngine::new(store, Arc::new(FakeEmbedder::new(DIM)), EngineOptions::default())
        .with_cross_encoder(Arc::new(FakeCrossEncoder));
    let results = engine.retrieve("mulch keeps the soil moist", 1, false).unwrap();
    assert_eq!(results[0].content, "mulch keeps the soil moist");
    assert_eq!(results[0].source_document_name, "garden");

    let reranked = engine.retrieve("gutter screens", 2, true).unwrap();
    assert_eq!(reranked[0].content, "check the gutter screens every autumn");
    assert!(reranked[0].rerank_score.unwrap() >= 2.0);
}

#[test]
fn deactivated_documents_drop_out_of_results() {
    let store = Arc::new(MemoryPassageStore::new());
    let ingest = ingestor(store.clone());
    let garden = ingest.add_document("garden.txt", "garden", GARDEN).unwrap().document;
    ingest.add_document("water.txt", "water", WATER).unwrap();
    store.set_document_active(garden.id, false).unwrap();

    let engine = RetrievalEngine::new(store, Arc::new(FakeEmbedder::new(DIM)), EngineOptions::default());
    let results = engine.retrieve("mulch keeps the soil moist", 10, false).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.source_document_name == "water"));
}

#[test]
fn approximate_path_builds_lazily_and_rebuilds_on_request() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryPassageStore::new());
    let ingest = ingestor(store.clone());
    ingest.add_document("water.txt", "water", WATER).unwrap();

    let embedder = Arc::new(FakeEmbedder::new(DIM));
    let uri = tmp.path().to_string_lossy().to_string();
    let index = Arc::new(ApproximateIndex::open(&uri, "passages", embedder.clone(), store.clone()).unwrap());
    let engine = RetrievalEngine::new(store.clone(), embedder, EngineOptions::default()).with_approximate_index(index.clone());

    assert!(!index.is_built());
    let first = engine.retrieve_approximate("first flush diverter", 5, false).unwrap();
    assert!(index.is_built());
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].content, "rainwater tanks need a first flush diverter");

    // new passages stay invisible until the explicit rebuild
    ingest.add_document("garden.txt", "garden", GARDEN).unwrap();
    assert_eq!(engine.retrieve_with(Strategy::Approximate, "mulch", 5).unwrap().len(), 2);
    assert_eq!(engine.rebuild_approximate_index().unwrap(), 4);
    assert_eq!(engine.retrieve_with(Strategy::Approximate, "mulch", 5).unwrap().len(), 4);
}
