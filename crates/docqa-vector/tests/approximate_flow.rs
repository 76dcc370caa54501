use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use docqa_core::chunking::content_hash;
use docqa_core::error::Error;
use docqa_core::store::MemoryPassageStore;
use docqa_core::traits::{Embedder, PassageStore, PassageWriter};
use docqa_core::types::{NewDocument, NewPassage};
use docqa_embed::FakeEmbedder;
use docqa_vector::ApproximateIndex;

const DIM: usize = 32;

fn seeded_store(texts: &[&str]) -> Arc<MemoryPassageStore> {
    let embedder = FakeEmbedder::new(DIM);
    let store = Arc::new(MemoryPassageStore::new());
    let doc = store
        .create_document(NewDocument {
            filename: "notes.txt".to_string(),
            display_name: "notes".to_string(),
            content_hash: content_hash("notes"),
            raw_content: texts.join("\n\n"),
            is_active: true,
        })
        .unwrap();
    let passages = texts
        .iter()
        .map(|t| NewPassage {
            content: t.to_string(),
            content_hash: content_hash(t),
            embedding: embedder.embed(t).unwrap(),
        })
        .collect();
    store.insert_passages(doc.id, passages).unwrap();
    store
}

fn index_for(dir: &tempfile::TempDir, store: Arc<MemoryPassageStore>) -> ApproximateIndex {
    let uri = dir.path().to_string_lossy().to_string();
    ApproximateIndex::open(&uri, "passages", Arc::new(FakeEmbedder::new(DIM)), store).unwrap()
}

#[test]
fn single_passage_round_trips_to_top_one() {
    let tmp = tempfile::tempdir().unwrap();
    let store = seeded_store(&["irrigação por gotejamento na horta"]);
    let index = index_for(&tmp, store.clone());
    index.build(&store.list_active_passages().unwrap()).unwrap();

    let results = index.search("irrigação por gotejamento na horta", 3).unwrap();
    assert_eq!(results.len(), 1);
    assert!((results[0].cosine_similarity - 1.0).abs() < 1e-3);
    assert_eq!(results[0].source_document_name, "notes");
}

#[test]
fn rebuilding_with_same_corpus_gives_same_results() {
    let tmp = tempfile::tempdir().unwrap();
    let store = seeded_store(&["galinhas botam ovos", "painel solar no telhado", "poço artesiano e bomba"]);
    let index = index_for(&tmp, store.clone());
    let corpus = store.list_active_passages().unwrap();

    index.build(&corpus).unwrap();
    let first: Vec<i64> = index.search("painel solar", 3).unwrap().iter().map(|r| r.passage_id).collect();
    index.build(&corpus).unwrap();
    let second: Vec<i64> = index.search("painel solar", 3).unwrap().iter().map(|r| r.passage_id).collect();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(index.len(), 3);
}

#[test]
fn empty_corpus_and_zero_k_return_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryPassageStore::new());
    let index = index_for(&tmp, store);
    index.build(&[]).unwrap();
    assert!(index.is_built());
    assert!(index.search("anything", 5).unwrap().is_empty());
    assert!(index.search("anything", 0).unwrap().is_empty());
}

#[test]
fn searching_before_build_is_an_index_error() {
    let tmp = tempfile::tempdir().unwrap();
    let index = index_for(&tmp, Arc::new(MemoryPassageStore::new()));
    assert!(matches!(index.search("x", 1), Err(Error::Index(_))));
}

#[test]
fn active_slot_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let store = seeded_store(&["compostagem de folhas", "conserva de tomate"]);
    {
        let index = index_for(&tmp, store.clone());
        index.build(&store.list_active_passages().unwrap()).unwrap();
    }
    let reopened = index_for(&tmp, store);
    assert!(reopened.is_built());
    assert_eq!(reopened.len(), 2);
    let top = reopened.search("conserva de tomate", 1).unwrap();
    assert_eq!(top[0].content, "conserva de tomate");
}

#[test]
fn wrong_embedding_dimension_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let store = seeded_store(&["texto"]);
    let mut corpus = store.list_active_passages().unwrap();
    corpus[0].embedding.truncate(3);
    let index = index_for(&tmp, store);
    assert!(matches!(index.build(&corpus), Err(Error::DimensionMismatch { expected: 32, actual: 3 })));
}

#[test]
fn concurrent_searches_see_old_or_new_index_in_full() {
    let tmp = tempfile::tempdir().unwrap();
    let store = seeded_store(&["sementes de milho", "sementes de feijão", "sementes de abóbora", "cerca elétrica"]);
    let index = index_for(&tmp, store.clone());
    let corpus = store.list_active_passages().unwrap();
    let old: Vec<i64> = corpus[..2].iter().map(|p| p.id).collect();
    let new: Vec<i64> = corpus.iter().map(|p| p.id).collect();
    index.build(&corpus[..2]).unwrap();

    let done = AtomicBool::new(false);
    let (index, done, old, new) = (&index, &done, &old, &new);
    thread::scope(|s| {
        let readers: Vec<_> = (0..3)
            .map(|_| {
                s.spawn(move || {
                    let mut searches = 0;
                    while !done.load(Ordering::Acquire) || searches == 0 {
                        let mut ids: Vec<i64> = index.search("sementes", 10).unwrap().iter().map(|r| r.passage_id).collect();
                        ids.sort_unstable();
                        assert!(&ids == old || &ids == new, "partial index observed: {ids:?}");
                        searches += 1;
                    }
                })
            })
            .collect();
        index.build(&corpus).unwrap();
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
    });

    assert_eq!(index.len(), 4);
    let mut ids: Vec<i64> = index.search("sementes", 10).unwrap().iter().map(|r| r.passage_id).collect();
    ids.sort_unstable();
    assert_eq!(&ids, new);
}
