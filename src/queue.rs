//! Durable job queue for downstream hand-off.
//!
//! One conceptual queue per pipeline stage, named stably across the
//! system. Delivery is at-least-once: a job row survives until a
//! consumer acks it, so consumers must be idempotent with respect to
//! the document/chunk id they receive. The ingestion core only ever
//! enqueues, and only after the referenced rows are committed.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::OcrMode;

/// Stable per-stage queue names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    Ingest,
    Split,
    Embed,
    Cluster,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Ingest => "ingest",
            QueueName::Split => "split",
            QueueName::Embed => "embed",
            QueueName::Cluster => "cluster",
        }
    }

    pub const ALL: &'static [QueueName] = &[
        QueueName::Ingest,
        QueueName::Split,
        QueueName::Embed,
        QueueName::Cluster,
    ];
}

/// A named operation plus its keyword arguments. The serde tag is the
/// operation identifier consumers dispatch on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JobPayload {
    /// Process a freshly uploaded file (consumed by ingestion workers).
    IngestFile {
        path: String,
        project_id: Option<String>,
        ocr_mode: OcrMode,
    },
    /// Split a converted document into minidocs and OCR them.
    SplitDocument {
        document_id: String,
        file_path: String,
        ocr_mode: OcrMode,
    },
    /// Embed one committed chunk.
    EmbedChunk {
        chunk_id: String,
        document_id: String,
    },
    /// Re-cluster documents of a project.
    ClusterDocuments { project_id: Option<String> },
}

impl JobPayload {
    /// The stage queue this payload belongs on.
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::IngestFile { .. } => QueueName::Ingest,
            JobPayload::SplitDocument { .. } => QueueName::Split,
            JobPayload::EmbedChunk { .. } => QueueName::Embed,
            JobPayload::ClusterDocuments { .. } => QueueName::Cluster,
        }
    }

    /// The operation identifier (the serde tag).
    pub fn op(&self) -> &'static str {
        match self {
            JobPayload::IngestFile { .. } => "ingest_file",
            JobPayload::SplitDocument { .. } => "split_document",
            JobPayload::EmbedChunk { .. } => "embed_chunk",
            JobPayload::ClusterDocuments { .. } => "cluster_documents",
        }
    }
}

/// A dequeued job, including its delivery count.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub payload: JobPayload,
    pub attempts: i64,
    pub enqueued_at: i64,
}

/// Queue client injected into the pipeline. The core only needs
/// `enqueue`; dequeue/ack live on the concrete consumer-side types.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably enqueues a payload on its stage queue, returning the job id.
    async fn enqueue(&self, payload: JobPayload) -> Result<String>;
}

/// SQLite-backed durable queue.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Leases the oldest job on a queue, bumping its delivery count. The
    /// row is not removed until [`ack`](Self::ack), so a consumer crash
    /// re-delivers it.
    pub async fn dequeue(&self, queue: QueueName) -> Result<Option<Job>> {
        let row = sqlx::query(
            "UPDATE jobs SET attempts = attempts + 1 \
             WHERE id = (SELECT id FROM jobs WHERE queue = ? ORDER BY enqueued_at, id LIMIT 1) \
             RETURNING id, payload, attempts, enqueued_at",
        )
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let payload_json: String = r.get("payload");
            let payload = serde_json::from_str(&payload_json)
                .map_err(|e| anyhow!("Malformed job payload: {}", e))?;
            Ok(Job {
                id: r.get("id"),
                payload,
                attempts: r.get("attempts"),
                enqueued_at: r.get("enqueued_at"),
            })
        })
        .transpose()
    }

    /// Completes a delivered job.
    pub async fn ack(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pending job count per queue, for `silo jobs`.
    pub async fn pending_counts(&self) -> Result<Vec<(QueueName, i64)>> {
        let mut counts = Vec::new();
        for queue in QueueName::ALL {
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ?")
                .bind(queue.as_str())
                .fetch_one(&self.pool)
                .await?;
            counts.push((*queue, n));
        }
        Ok(counts)
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(&self, payload: JobPayload) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let json = serde_json::to_string(&payload)?;
        sqlx::query(
            "INSERT INTO jobs (id, queue, op, payload, attempts, enqueued_at) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(payload.queue().as_str())
        .bind(payload.op())
        .bind(&json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }
}

/// In-memory queue for tests: records payloads in enqueue order.
#[derive(Default)]
pub struct InMemoryQueue {
    jobs: Mutex<Vec<JobPayload>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<JobPayload> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, payload: JobPayload) -> Result<String> {
        self.jobs.lock().unwrap().push(payload);
        Ok(Uuid::new_v4().to_string())
    }
}
