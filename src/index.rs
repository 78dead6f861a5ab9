//! The in-memory passage index.
//!
//! Passages and their vectors load once at startup; a lookup embeds the
//! query and ranks every stored vector by cosine similarity. The loaded
//! index never changes afterwards, so handlers share it through a plain
//! `Arc` with no locking.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, Embedder};
use crate::ingest;
use crate::migrate;
use crate::models::ScoredPassage;

/// Lookup seam between the chat pipeline and whatever holds the passages.
#[async_trait]
pub trait PassageIndex: Send + Sync {
    /// The best-matching passages for `query`, highest score first.
    async fn top_passages(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>>;

    /// Number of indexed passages.
    fn len(&self) -> usize;
}

struct IndexEntry {
    text: String,
    file_name: String,
    vector: Vec<f32>,
}

/// Brute-force cosine index over all stored passage vectors.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    /// Loads every stored passage and vector into memory.
    pub async fn load(pool: &SqlitePool, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let rows = sqlx::query(
            r#"
            SELECT p.text, d.file_name, v.embedding
            FROM passage_vectors v
            JOIN passages p ON p.id = v.passage_id
            JOIN documents d ON d.id = p.document_id
            ORDER BY d.file_name, p.seq
            "#,
        )
        .fetch_all(pool)
        .await?;

        let entries = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexEntry {
                    text: row.get("text"),
                    file_name: row.get("file_name"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(Self { entries, embedder })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PassageIndex for VectorIndex {
    async fn top_passages(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        let query_vec = self.embedder.embed_query(query).await?;

        let mut scored: Vec<ScoredPassage> = self
            .entries
            .iter()
            .map(|entry| ScoredPassage {
                text: entry.text.clone(),
                file_name: entry.file_name.clone(),
                score: cosine_similarity(&query_vec, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Opens the knowledge base, building it first when the store is empty.
///
/// Returns `None` when nothing usable exists; the caller then serves
/// without retrieval. Build problems are logged, never fatal.
pub async fn open_or_build(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Option<Arc<dyn PassageIndex>> {
    match try_open_or_build(config, embedder).await {
        Ok(Some(index)) => Some(index),
        Ok(None) => None,
        Err(err) => {
            warn!(error = %err, "knowledge base unavailable, retrieval disabled");
            None
        }
    }
}

async fn try_open_or_build(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<Option<Arc<dyn PassageIndex>>> {
    let pool = db::connect(&config.knowledge.db_path).await?;
    migrate::run_migrations(&pool).await?;

    if ingest::stored_vector_count(&pool).await? == 0 {
        let report = ingest::build_knowledge_base(config, &pool, embedder.as_ref()).await?;
        if report.passages_indexed == 0 {
            pool.close().await;
            return Ok(None);
        }
        info!(
            documents = report.documents_indexed,
            passages = report.passages_indexed,
            "knowledge base built"
        );
    }

    let index = VectorIndex::load(&pool, embedder).await?;
    pool.close().await;

    if index.is_empty() {
        return Ok(None);
    }
    info!(passages = index.len(), "knowledge base ready");
    Ok(Some(Arc::new(index)))
}
