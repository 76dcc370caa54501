//! Approximate top-k search over normalized passage embeddings.
//!
//! Two lancedb tables (`<name>_a`, `<name>_b`) act as build slots. A rebuild
//! fills the inactive slot, then publishes it by swapping the snapshot pointer,
//! so readers always see either the previous index or the complete new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use arrow_array::{Array, Float32Array, Int64Array, RecordBatchIterator};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument, warn};

use docqa_core::error::{Error, Result};
use docqa_core::math::{check_dimension, l2_normalized};
use docqa_core::ranking::sort_desc_by;
use docqa_core::traits::{Embedder, PassageStore, Retriever};
use docqa_core::types::{Passage, PassageId, ScoredResult, NO_MATCH};

use crate::index_build::{build_ivfpq_index, compute_ivfpq_params, MIN_ROWS_FOR_IVFPQ};
use crate::schema::{passage_vector_schema, vectors_to_record_batch, ID_COLUMN};
use crate::table::{ensure_table, get_meta, open_db, set_meta, table_exists};

fn index_err(e: impl std::fmt::Display) -> Error {
    Error::Index(e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Slot::A => "a",
            Slot::B => "b",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "a" => Some(Slot::A),
            "b" => Some(Slot::B),
            _ => None,
        }
    }
}

struct IndexSnapshot {
    table: Table,
    slot: Slot,
    rows: usize,
}

pub struct ApproximateIndex {
    runtime: Runtime,
    conn: Connection,
    table_name: String,
    dim: usize,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn PassageStore>,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: Mutex<()>,
}

impl ApproximateIndex {
    /// Connects to the lancedb directory at `uri` and reopens the slot that was
    /// active when this process or a previous one last built the index.
    pub fn open(uri: &str, table_name: &str, embedder: Arc<dyn Embedder>, store: Arc<dyn PassageStore>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        let dim = embedder.dim();
        let (conn, current) = runtime.block_on(async {
            let conn = open_db(uri).await.map_err(index_err)?;
            let current = Self::load_active(&conn, table_name).await.map_err(index_err)?;
            Ok::<_, Error>((conn, current))
        })?;
        if let Some(snapshot) = &current {
            info!(table = table_name, slot = snapshot.slot.suffix(), rows = snapshot.rows, "reopened approximate index");
        }
        Ok(Self {
            runtime,
            conn,
            table_name: table_name.to_string(),
            dim,
            embedder,
            store,
            current: RwLock::new(current.map(Arc::new)),
            build_lock: Mutex::new(()),
        })
    }

    fn active_key(table_name: &str) -> String {
        format!("active_slot:{table_name}")
    }

    fn slot_table(table_name: &str, slot: Slot) -> String {
        format!("{}_{}", table_name, slot.suffix())
    }

    async fn load_active(conn: &Connection, table_name: &str) -> anyhow::Result<Option<IndexSnapshot>> {
        let Some(slot) = get_meta(conn, &Self::active_key(table_name)).await?.as_deref().and_then(Slot::parse) else {
            return Ok(None);
        };
        let name = Self::slot_table(table_name, slot);
        if !table_exists(conn, &name).await? {
            return Ok(None);
        }
        let table = conn.open_table(&name).execute().await?;
        let rows = table.count_rows(None).await?;
        Ok(Some(IndexSnapshot { table, slot, rows }))
    }

    pub fn is_built(&self) -> bool {
        self.current.read().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Number of vectors in the published snapshot.
    pub fn len(&self) -> usize {
        self.snapshot().ok().flatten().map_or(0, |s| s.rows)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Result<Option<Arc<IndexSnapshot>>> {
        self.current
            .read()
            .map(|c| c.clone())
            .map_err(|_| Error::Index("index snapshot lock poisoned".to_string()))
    }

    /// Replaces the index contents with `corpus`, normalizing each embedding.
    #[instrument(skip_all, fields(table = %self.table_name, corpus = corpus.len()))]
    pub fn build(&self, corpus: &[Passage]) -> Result<()> {
        let started = Instant::now();
        let mut rows = Vec::with_capacity(corpus.len());
        for p in corpus {
            check_dimension(self.dim, p.embedding.len())?;
            rows.push((p.id, l2_normalized(&p.embedding)));
        }

        let _guard = self.build_lock.lock().map_err(|_| Error::Index("build lock poisoned".to_string()))?;
        let target = self.snapshot()?.map_or(Slot::A, |s| s.slot.other());
        let name = Self::slot_table(&self.table_name, target);
        let table = self.runtime.block_on(self.fill_slot(&name, &rows)).map_err(index_err)?;
        self.runtime
            .block_on(set_meta(&self.conn, &Self::active_key(&self.table_name), target.suffix()))
            .map_err(index_err)?;

        let snapshot = Arc::new(IndexSnapshot { table, slot: target, rows: rows.len() });
        *self.current.write().map_err(|_| Error::Index("index snapshot lock poisoned".to_string()))? = Some(snapshot);
        info!(
            slot = target.suffix(),
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "approximate index published"
        );
        Ok(())
    }

    async fn fill_slot(&self, name: &str, rows: &[(PassageId, Vec<f32>)]) -> anyhow::Result<Table> {
        let schema = passage_vector_schema(self.dim);
        ensure_table(&self.conn, name, schema.clone()).await?;
        let table = self.conn.open_table(name).execute().await?;
        table.delete("true").await?;
        if !rows.is_empty() {
            let batch = vectors_to_record_batch(rows, self.dim)?;
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
            table.add(reader).execute().await?;
        }
        if rows.len() >= MIN_ROWS_FOR_IVFPQ {
            let params = compute_ivfpq_params(rows.len(), self.dim);
            debug!(nlist = params.nlist, m = params.m, "training ivf-pq");
            build_ivfpq_index(&table, &params).await?;
        }
        Ok(table)
    }

    async fn nearest(table: &Table, query: Vec<f32>, k: usize) -> anyhow::Result<Vec<(PassageId, f32)>> {
        let mut stream = table.vector_search(query)?.distance_type(DistanceType::Dot).limit(k).execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let ids = batch.column_by_name(ID_COLUMN).and_then(|c| c.as_any().downcast_ref::<Int64Array>());
            let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            let (Some(ids), Some(distances)) = (ids, distances) else {
                warn!("search batch without id or distance column");
                continue;
            };
            for i in 0..batch.num_rows() {
                if ids.is_null(i) || ids.value(i) == NO_MATCH {
                    continue;
                }
                // Dot distance is 1 - <q, v>.
                hits.push((ids.value(i), 1.0 - distances.value(i)));
            }
        }
        Ok(hits)
    }

    /// Approximate top-k by inner product of normalized vectors.
    ///
    /// Fails with [`Error::Index`] until [`ApproximateIndex::build`] has run once.
    #[instrument(skip(self, query), fields(table = %self.table_name))]
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let snapshot = self
            .snapshot()?
            .ok_or_else(|| Error::Index(format!("approximate index '{}' has not been built", self.table_name)))?;
        if snapshot.rows == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let query_vec = self.embedder.embed(query)?;
        check_dimension(self.dim, query_vec.len())?;
        let hits = self
            .runtime
            .block_on(Self::nearest(&snapshot.table, l2_normalized(&query_vec), top_k))
            .map_err(index_err)?;

        let ids: Vec<PassageId> = hits.iter().map(|(id, _)| *id).collect();
        let passages: HashMap<PassageId, Passage> =
            self.store.list_passages_by_ids(&ids)?.into_iter().map(|p| (p.id, p)).collect();
        let mut results: Vec<ScoredResult> = hits
            .into_iter()
            .filter_map(|(id, score)| passages.get(&id).map(|p| ScoredResult::from_passage(p, score.clamp(-1.0, 1.0))))
            .collect();
        sort_desc_by(&mut results, |r| r.cosine_similarity);
        results.truncate(top_k);
        debug!(hits = results.len(), elapsed_ms = started.elapsed().as_millis() as u64, "approximate search");
        Ok(results)
    }
}

impl Retriever for ApproximateIndex {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        self.search(query, top_k)
    }
}
