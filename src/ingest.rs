//! Knowledge-base construction.
//!
//! Builds the passage store from the configured document list: extract text,
//! split into passages, embed in batches, persist. Missing or broken source
//! files are skipped with a warning and the build carries on with the rest;
//! an embedding failure aborts the build before anything is written.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

use crate::chunk::split_passages;
use crate::config::Config;
use crate::embedding::{vec_to_blob, Embedder};
use crate::extract;
use crate::models::Passage;

/// Counters reported after a build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub documents_indexed: u64,
    pub documents_skipped: u64,
    pub passages_indexed: u64,
}

struct PendingDocument {
    id: String,
    file_name: String,
    path: PathBuf,
}

/// Builds the knowledge base from `config.knowledge.documents`.
///
/// Nothing is written until every passage has an embedding, and the writes
/// go through a single transaction, so a failed build leaves the store
/// exactly as it was.
pub async fn build_knowledge_base(
    config: &Config,
    pool: &SqlitePool,
    embedder: &dyn Embedder,
) -> Result<BuildReport> {
    let mut report = BuildReport::default();
    let mut documents: Vec<PendingDocument> = Vec::new();
    let mut passages: Vec<Passage> = Vec::new();

    for path in &config.knowledge.documents {
        if !path.exists() {
            warn!(path = %path.display(), "knowledge document missing, skipping");
            report.documents_skipped += 1;
            continue;
        }

        let text = match extract::extract_file(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "extraction failed, skipping");
                report.documents_skipped += 1;
                continue;
            }
        };

        let doc_id = Uuid::new_v4().to_string();
        let doc_passages = split_passages(&doc_id, &text, config.knowledge.chunk_tokens);
        if doc_passages.is_empty() {
            warn!(path = %path.display(), "document produced no text, skipping");
            report.documents_skipped += 1;
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        report.documents_indexed += 1;
        report.passages_indexed += doc_passages.len() as u64;
        documents.push(PendingDocument {
            id: doc_id,
            file_name,
            path: path.clone(),
        });
        passages.extend(doc_passages);
    }

    if passages.is_empty() {
        return Ok(report);
    }

    let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(config.embedding.batch_size.max(1)) {
        let mut embedded = embedder
            .embed(batch)
            .await
            .context("Failed to embed knowledge passages")?;
        vectors.append(&mut embedded);
    }

    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    for doc in &documents {
        sqlx::query("INSERT INTO documents (id, file_name, path, ingested_at) VALUES (?, ?, ?, ?)")
            .bind(&doc.id)
            .bind(&doc.file_name)
            .bind(doc.path.display().to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    for (passage, vector) in passages.iter().zip(vectors.iter()) {
        sqlx::query("INSERT INTO passages (id, document_id, seq, text, hash) VALUES (?, ?, ?, ?, ?)")
            .bind(&passage.id)
            .bind(&passage.document_id)
            .bind(passage.seq)
            .bind(&passage.text)
            .bind(&passage.hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO passage_vectors (passage_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(&passage.id)
        .bind(embedder.model_name())
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(report)
}

/// Drops every stored document, passage, and vector.
pub async fn clear_knowledge_base(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM passage_vectors")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM passages")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Number of stored passage vectors; zero means there is nothing to load.
pub async fn stored_vector_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passage_vectors")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
