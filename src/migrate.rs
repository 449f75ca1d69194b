use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the full schema. Idempotent; `silo init` runs this against a
/// fresh pool and ingestion assumes it has been run.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Documents: the fingerprint UNIQUE constraint is the dedup
    // arbiter under concurrent ingestion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            path TEXT NOT NULL,
            source_path TEXT NOT NULL,
            fingerprint TEXT NOT NULL UNIQUE,
            doc_type TEXT NOT NULL,
            project_id TEXT,
            num_pages INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            subject TEXT,
            author TEXT,
            created_date TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS minidocs (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            minidoc_id TEXT NOT NULL UNIQUE,
            page_start INTEGER NOT NULL,
            page_end INTEGER NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS date_mentions (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            mention_text TEXT NOT NULL,
            position INTEGER NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timeline_events (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            event_date TEXT NOT NULL,
            description TEXT NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensitive_matches (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            pattern_type TEXT NOT NULL,
            match_text TEXT NOT NULL,
            confidence REAL NOT NULL,
            start_pos INTEGER NOT NULL,
            end_pos INTEGER NOT NULL,
            context_before TEXT NOT NULL,
            context_after TEXT NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Durable job queue. Rows stay until acked, so a consumer that dies
    // mid-job leaves the job deliverable again (at-least-once).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            queue TEXT NOT NULL,
            op TEXT NOT NULL,
            payload TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            enqueued_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_minidocs_document_id ON minidocs(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_queue ON jobs(queue, enqueued_at)")
        .execute(pool)
        .await?;

    Ok(())
}
