//! SQLite persistence for documents, minidocs, chunks, and detector
//! artifacts.
//!
//! The two commit operations are the durability boundary the dispatcher
//! depends on: everything a downstream job references is written in one
//! transaction, and a unique-violation on the fingerprint column is
//! surfaced as [`CommitOutcome::DuplicateFingerprint`] so a lost dedup
//! race is the duplicate path, not a failure.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::models::{Chunk, ChunkArtifacts, Document, DocumentStatus, MiniDoc};

/// Result of a commit attempt. `DuplicateFingerprint` means another
/// attempt inserted the same content first; nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    DuplicateFingerprint,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Dedup gate lookup: the id of the document already holding this
    /// fingerprint, if any.
    pub async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<String>> {
        let id = sqlx::query_scalar("SELECT id FROM documents WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Commits a text-native ingestion: the document, its single
    /// minidoc, every chunk, and all detector artifacts, atomically.
    pub async fn commit_text_document(
        &self,
        doc: &Document,
        minidoc: &MiniDoc,
        chunks: &[Chunk],
        artifacts: &ChunkArtifacts,
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Err(err) = insert_document(&mut tx, doc).await {
            return duplicate_or_bail(tx, err).await;
        }

        sqlx::query(
            "INSERT INTO minidocs (id, document_id, minidoc_id, page_start, page_end, status) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&minidoc.id)
        .bind(&minidoc.document_id)
        .bind(&minidoc.minidoc_id)
        .bind(minidoc.page_start)
        .bind(minidoc.page_end)
        .bind(&minidoc.status)
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }

        for mention in &artifacts.date_mentions {
            sqlx::query(
                "INSERT INTO date_mentions (id, chunk_id, document_id, mention_text, position) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&mention.id)
            .bind(&mention.chunk_id)
            .bind(&mention.document_id)
            .bind(&mention.mention_text)
            .bind(mention.position)
            .execute(&mut *tx)
            .await?;
        }

        for event in &artifacts.events {
            sqlx::query(
                "INSERT INTO timeline_events (id, chunk_id, document_id, event_date, description) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&event.id)
            .bind(&event.chunk_id)
            .bind(&event.document_id)
            .bind(&event.event_date)
            .bind(&event.description)
            .execute(&mut *tx)
            .await?;
        }

        for m in &artifacts.sensitive_matches {
            sqlx::query(
                "INSERT INTO sensitive_matches \
                 (id, chunk_id, document_id, pattern_type, match_text, confidence, \
                  start_pos, end_pos, context_before, context_after) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&m.id)
            .bind(&m.chunk_id)
            .bind(&m.document_id)
            .bind(&m.pattern_type)
            .bind(&m.match_text)
            .bind(m.confidence)
            .bind(m.start_pos)
            .bind(m.end_pos)
            .bind(&m.context_before)
            .bind(&m.context_after)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    /// Commits a conversion-branch ingestion: just the document row
    /// (status `uploaded`, page count 0).
    pub async fn commit_conversion_document(&self, doc: &Document) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;
        if let Err(err) = insert_document(&mut tx, doc).await {
            return duplicate_or_bail(tx, err).await;
        }
        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| document_from_row(&r)).transpose()
    }

    pub async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text FROM chunks \
             WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Chunk {
                id: r.get("id"),
                document_id: r.get("document_id"),
                chunk_index: r.get("chunk_index"),
                text: r.get("text"),
            })
            .collect())
    }

    pub async fn minidocs_for_document(&self, document_id: &str) -> Result<Vec<MiniDoc>> {
        let rows = sqlx::query(
            "SELECT id, document_id, minidoc_id, page_start, page_end, status FROM minidocs \
             WHERE document_id = ? ORDER BY minidoc_id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| MiniDoc {
                id: r.get("id"),
                document_id: r.get("document_id"),
                minidoc_id: r.get("minidoc_id"),
                page_start: r.get("page_start"),
                page_end: r.get("page_end"),
                status: r.get("status"),
            })
            .collect())
    }

    pub async fn count_documents(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

async fn insert_document(
    tx: &mut Transaction<'_, Sqlite>,
    doc: &Document,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO documents \
         (id, title, path, source_path, fingerprint, doc_type, project_id, \
          num_pages, status, subject, author, created_date, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&doc.id)
    .bind(&doc.title)
    .bind(&doc.path)
    .bind(&doc.source_path)
    .bind(&doc.fingerprint)
    .bind(&doc.doc_type)
    .bind(&doc.project_id)
    .bind(doc.num_pages)
    .bind(doc.status.as_str())
    .bind(&doc.subject)
    .bind(&doc.author)
    .bind(doc.created_date.map(|d| d.to_rfc3339()))
    .bind(doc.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Rolls back and maps a fingerprint unique-violation to the duplicate
/// outcome; any other error propagates.
async fn duplicate_or_bail(
    tx: Transaction<'_, Sqlite>,
    err: sqlx::Error,
) -> Result<CommitOutcome> {
    tx.rollback().await?;
    if is_unique_violation(&err) {
        Ok(CommitOutcome::DuplicateFingerprint)
    } else {
        Err(err.into())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    let created_date: Option<String> = row.get("created_date");
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        path: row.get("path"),
        source_path: row.get("source_path"),
        fingerprint: row.get("fingerprint"),
        doc_type: row.get("doc_type"),
        project_id: row.get("project_id"),
        num_pages: row.get("num_pages"),
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown document status in store: '{}'", status))?,
        subject: row.get("subject"),
        author: row.get("author"),
        created_date: created_date
            .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&Utc)),
        created_at: row.get("created_at"),
    })
}
