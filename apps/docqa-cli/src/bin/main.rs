use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docqa_core::chunking::Chunker;
use docqa_core::config::{resolve_with_base, Settings};
use docqa_core::store::MemoryPassageStore;
use docqa_core::traits::PassageWriter;
use docqa_core::types::Strategy;
use docqa_embed::{load_cross_encoder, load_embedder};
use docqa_hybrid::{EngineOptions, Ingestor, RetrievalEngine};
use docqa_text::{SynonymExpander, SynonymMap};
use docqa_vector::ApproximateIndex;

#[derive(Parser)]
#[command(name = "docqa", about = "Local passage retrieval over plain-text documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store every .txt file under DIR.
    Ingest {
        /// Defaults to data.raw_txt_dir.
        dir: Option<PathBuf>,
        /// Rebuild the approximate index afterwards.
        #[arg(long)]
        index: bool,
    },
    /// Retrieve passages for TEXT and print them as JSON.
    Query {
        text: String,
        #[arg(long)]
        strategy: Option<Strategy>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        rerank: bool,
        /// Graph expansion rounds, graph strategy only.
        #[arg(long)]
        hops: Option<usize>,
        #[arg(long)]
        bm25_weight: Option<f32>,
        #[arg(long)]
        embedding_weight: Option<f32>,
    },
    /// List stored documents.
    Documents,
    /// Include or exclude a document from retrieval.
    Activate {
        id: i64,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
    /// Rebuild the approximate index from the active passages.
    Reindex,
}

struct Paths {
    store: PathBuf,
    lancedb: PathBuf,
    raw_txt: PathBuf,
}

impl Paths {
    fn resolve(settings: &Settings) -> anyhow::Result<Self> {
        let base = std::env::current_dir()?;
        Ok(Self {
            store: resolve_with_base(&base, &settings.data.store_path),
            lancedb: resolve_with_base(&base, &settings.data.lancedb_dir),
            raw_txt: resolve_with_base(&base, &settings.data.raw_txt_dir),
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("loading configuration")?;
    let paths = Paths::resolve(&settings)?;
    let store = Arc::new(MemoryPassageStore::load_or_default(&paths.store)?);

    match cli.command {
        Command::Ingest { dir, index } => {
            let dir = dir.unwrap_or_else(|| paths.raw_txt.clone());
            ingest_dir(&settings, store.clone(), &dir)?;
            store.save(&paths.store)?;
            if index {
                let rows = build_engine(&settings, &paths, store, true, false)?.rebuild_approximate_index()?;
                info!(rows, "approximate index rebuilt");
            }
        }
        Command::Query { text, strategy, top_k, rerank, hops, bm25_weight, embedding_weight } => {
            let r = &settings.retrieval;
            let strategy = strategy.unwrap_or(r.strategy);
            let top_k = top_k.unwrap_or(r.default_top_k);
            let engine = build_engine(&settings, &paths, store, strategy == Strategy::Approximate, rerank)?;
            let results = match strategy {
                Strategy::Dense => engine.retrieve(&text, top_k, rerank)?,
                Strategy::Hybrid => engine.retrieve_hybrid(
                    &text,
                    top_k,
                    bm25_weight.unwrap_or(r.bm25_weight),
                    embedding_weight.unwrap_or(r.embedding_weight),
                )?,
                Strategy::Approximate => engine.retrieve_approximate(&text, top_k, rerank)?,
                Strategy::Graph => engine.retrieve_graph(&text, top_k, hops.unwrap_or(r.graph_hops))?,
            };
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Documents => {
            for doc in store.list_documents()? {
                let passages = store.list_document_passages(doc.id)?.len();
                let state = if doc.is_active { "active" } else { "inactive" };
                println!("{:>5}  {:<8}  {:>4} passages  {} ({})", doc.id, state, passages, doc.display_name, doc.filename);
            }
        }
        Command::Activate { id, active } => {
            if store.set_document_active(id, active)?.is_none() {
                bail!("no document with id {id}");
            }
            store.save(&paths.store)?;
            info!(id, active, "document updated");
        }
        Command::Reindex => {
            let rows = build_engine(&settings, &paths, store, true, false)?.rebuild_approximate_index()?;
            info!(rows, "approximate index rebuilt");
        }
    }
    Ok(())
}

/// Opens lancedb only when `approximate` is set; the other paths never touch it.
fn build_engine(
    settings: &Settings,
    paths: &Paths,
    store: Arc<MemoryPassageStore>,
    approximate: bool,
    rerank: bool,
) -> anyhow::Result<RetrievalEngine> {
    let embedder = load_embedder(&settings.models)?;
    let mut engine = RetrievalEngine::new(store.clone(), embedder.clone(), EngineOptions::from(&settings.retrieval));
    if approximate {
        let uri = paths.lancedb.to_string_lossy().to_string();
        let index = ApproximateIndex::open(&uri, &settings.data.index_table, embedder, store)?;
        engine = engine.with_approximate_index(Arc::new(index));
    }
    if rerank {
        engine = engine.with_cross_encoder(load_cross_encoder(&settings.models)?);
    }
    if let Some(path) = &settings.retrieval.synonyms_path {
        let path = resolve_with_base(&std::env::current_dir()?, path);
        let map = SynonymMap::load(&path, &settings.retrieval.language)?;
        info!(synsets = map.len(), path = %path.display(), "loaded synonyms");
        engine = engine.with_synonyms(Arc::new(SynonymExpander::new(map)));
    }
    Ok(engine)
}

fn ingest_dir(settings: &Settings, store: Arc<MemoryPassageStore>, dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "txt"))
        .map(|e| e.into_path())
        .collect();
    info!(files = files.len(), dir = %dir.display(), "ingesting");

    let ingestor = Ingestor::new(store, load_embedder(&settings.models)?, Chunker::new(settings.chunking.clone()));
    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    let (mut added, mut skipped, mut passages) = (0usize, 0usize, 0usize);
    for path in &files {
        let filename = path.strip_prefix(dir).unwrap_or(path).to_string_lossy().to_string();
        bar.set_message(filename.clone());
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable file");
                bar.inc(1);
                continue;
            }
        };
        let display_name = path.file_stem().map_or_else(|| filename.clone(), |s| s.to_string_lossy().to_string());
        let outcome = ingestor.add_document(&filename, &display_name, &raw)?;
        if outcome.duplicate {
            skipped += 1;
        } else {
            added += 1;
            passages += outcome.passages.len();
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    info!(added, skipped, passages, "ingestion finished");
    Ok(())
}
