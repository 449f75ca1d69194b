//! The ingestion pipeline: fingerprint, dedup, place, extract or
//! convert, commit, then hand off to downstream queues.
//!
//! The ordering invariant lives here: rows are committed before any job
//! referencing them is enqueued, so a consumer can never dequeue a job
//! whose document or chunks are not yet visible. Any error on the way
//! quarantines the file instead of failing the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunker::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::convert::{LopdfConverter, PdfConverter};
use crate::detect::{RegexSensitiveDetector, RegexTimelineDetector, SensitiveDataDetector, TimelineDetector};
use crate::extract::{extension_of, is_text_native, BuiltinExtractor, ExtractOutcome, ExtractedText, TextExtractor};
use crate::fingerprint::fingerprint_file;
use crate::models::{
    apply_metadata, Chunk, ChunkArtifacts, Document, DocumentStatus, MiniDoc, OcrMode,
    SensitiveDataMatch,
};
use crate::queue::{JobPayload, JobQueue};
use crate::storage;
use crate::store::{CommitOutcome, SqliteStore};

/// What happened to one ingested file.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Text-native branch: chunks committed, embed jobs dispatched.
    Embedded { document_id: String, chunks: usize },
    /// Conversion branch: document committed, split job dispatched.
    HandedOff { document_id: String },
    /// Content already known; nothing was written. `moved_to` is where
    /// the redundant copy now resides: the `processed/` holding area
    /// when the dedup gate caught it, or the shared content-addressed
    /// storage path when the duplicate surfaced at commit time (the
    /// inbound copy was already consumed by placement by then).
    Duplicate {
        existing_document_id: String,
        moved_to: PathBuf,
    },
    /// The attempt failed; the file is in `failed/` and logged.
    Quarantined { moved_to: PathBuf, error: String },
}

/// One pass over the pipeline's stages for a single file. Collaborators
/// behind traits so tests can swap in failing or recording doubles.
pub struct IngestPipeline {
    store: SqliteStore,
    queue: Arc<dyn JobQueue>,
    extractor: Arc<dyn TextExtractor>,
    converter: Arc<dyn PdfConverter>,
    timeline: Arc<dyn TimelineDetector>,
    sensitive: Arc<dyn SensitiveDataDetector>,
    storage_dir: PathBuf,
    chunking: ChunkingConfig,
    default_ocr: OcrMode,
}

impl IngestPipeline {
    pub fn new(store: SqliteStore, queue: Arc<dyn JobQueue>, config: &Config) -> Self {
        Self {
            store,
            queue,
            extractor: Arc::new(BuiltinExtractor),
            converter: Arc::new(LopdfConverter::new(BuiltinExtractor)),
            timeline: Arc::new(RegexTimelineDetector),
            sensitive: Arc::new(RegexSensitiveDetector),
            storage_dir: config.storage.documents_dir.clone(),
            chunking: config.chunking.clone(),
            default_ocr: config.ocr.mode,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn PdfConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_timeline_detector(mut self, detector: Arc<dyn TimelineDetector>) -> Self {
        self.timeline = detector;
        self
    }

    pub fn with_sensitive_detector(mut self, detector: Arc<dyn SensitiveDataDetector>) -> Self {
        self.sensitive = detector;
        self
    }

    /// Ingests one file. Pipeline errors do not propagate: the file is
    /// quarantined and reported as [`IngestOutcome::Quarantined`]. Only
    /// a failure of the quarantine move itself returns `Err`.
    pub async fn ingest(
        &self,
        path: &Path,
        project_id: Option<&str>,
        ocr_mode: Option<OcrMode>,
    ) -> Result<IngestOutcome> {
        // The file may move into permanent storage mid-attempt; track
        // where it lives so quarantine picks it up from there.
        let mut current = path.to_path_buf();
        match self.run(path, &mut current, project_id, ocr_mode).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "ingestion failed");
                let moved_to = storage::quarantine_file(&current, path, &format!("{:#}", err))?;
                Ok(IngestOutcome::Quarantined {
                    moved_to,
                    error: format!("{:#}", err),
                })
            }
        }
    }

    async fn run(
        &self,
        inbound: &Path,
        current: &mut PathBuf,
        project_id: Option<&str>,
        ocr_mode: Option<OcrMode>,
    ) -> Result<IngestOutcome> {
        let fingerprint = fingerprint_file(inbound)?;

        // Fast-path dedup gate. The commit's unique constraint is the
        // arbiter when two attempts race past this check.
        if let Some(existing) = self.store.find_by_fingerprint(&fingerprint).await? {
            let moved_to = storage::move_to_processed(inbound)?;
            tracing::info!(file = %inbound.display(), document_id = %existing, "duplicate content");
            return Ok(IngestOutcome::Duplicate {
                existing_document_id: existing,
                moved_to,
            });
        }

        let placed = storage::place_file(inbound, &fingerprint, &self.storage_dir)?;
        *current = placed.clone();

        if is_text_native(inbound) {
            match self.extractor.extract(&placed) {
                ExtractOutcome::Extracted(extracted) => {
                    return self
                        .ingest_text(inbound, &placed, &fingerprint, project_id, extracted)
                        .await;
                }
                ExtractOutcome::Empty => {
                    tracing::warn!(file = %inbound.display(), "no extractable text, falling back to conversion");
                }
                ExtractOutcome::Failed(reason) => {
                    tracing::warn!(file = %inbound.display(), reason = %reason, "text extraction failed, falling back to conversion");
                }
            }
        }

        self.ingest_via_conversion(inbound, &placed, &fingerprint, project_id, ocr_mode)
            .await
    }

    /// Text-native branch: chunk, run detectors, commit everything in
    /// one transaction, then enqueue one embed job per chunk.
    async fn ingest_text(
        &self,
        inbound: &Path,
        placed: &Path,
        fingerprint: &str,
        project_id: Option<&str>,
        extracted: ExtractedText,
    ) -> Result<IngestOutcome> {
        let mut doc = self.new_document(inbound, placed, fingerprint, project_id);
        doc.status = DocumentStatus::Embedded;
        doc.num_pages = 1;
        apply_metadata(&mut doc, &extracted.metadata);

        let minidoc = MiniDoc {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            minidoc_id: format!("{}__text_001", fingerprint),
            page_start: 1,
            page_end: 1,
            status: "parsed".to_string(),
        };

        let chunks = chunk_text(
            &doc.id,
            &extracted.text,
            self.chunking.window,
            self.chunking.overlap,
        );
        let artifacts = self.detect_artifacts(&doc, &chunks);

        match self
            .store
            .commit_text_document(&doc, &minidoc, &chunks, &artifacts)
            .await?
        {
            CommitOutcome::Committed => {}
            CommitOutcome::DuplicateFingerprint => return self.lost_race(fingerprint, placed).await,
        }

        // Commit first, enqueue after: a consumer must never see a job
        // for rows that are not yet visible.
        for chunk in &chunks {
            self.queue
                .enqueue(JobPayload::EmbedChunk {
                    chunk_id: chunk.id.clone(),
                    document_id: doc.id.clone(),
                })
                .await
                .context("Failed to enqueue embed job")?;
        }

        tracing::info!(
            document_id = %doc.id,
            chunks = chunks.len(),
            file = %inbound.display(),
            "text document ingested"
        );
        Ok(IngestOutcome::Embedded {
            document_id: doc.id,
            chunks: chunks.len(),
        })
    }

    /// Conversion branch: ensure a PDF exists, commit the document row
    /// as `uploaded`, then enqueue the split job.
    async fn ingest_via_conversion(
        &self,
        inbound: &Path,
        placed: &Path,
        fingerprint: &str,
        project_id: Option<&str>,
        ocr_mode: Option<OcrMode>,
    ) -> Result<IngestOutcome> {
        let pdf_path = if extension_of(inbound) == ".pdf" {
            placed.to_path_buf()
        } else {
            self.converter
                .convert(placed)
                .map_err(|e| anyhow!("{}", e))
                .with_context(|| format!("Failed to convert {} to PDF", inbound.display()))?
        };

        let doc = self.new_document(inbound, placed, fingerprint, project_id);

        match self.store.commit_conversion_document(&doc).await? {
            CommitOutcome::Committed => {}
            CommitOutcome::DuplicateFingerprint => return self.lost_race(fingerprint, placed).await,
        }

        self.queue
            .enqueue(JobPayload::SplitDocument {
                document_id: doc.id.clone(),
                file_path: pdf_path.to_string_lossy().into_owned(),
                ocr_mode: ocr_mode.unwrap_or(self.default_ocr),
            })
            .await
            .context("Failed to enqueue split job")?;

        tracing::info!(
            document_id = %doc.id,
            file = %inbound.display(),
            pdf = %pdf_path.display(),
            "document handed off for splitting"
        );
        Ok(IngestOutcome::HandedOff {
            document_id: doc.id,
        })
    }

    fn new_document(
        &self,
        inbound: &Path,
        placed: &Path,
        fingerprint: &str,
        project_id: Option<&str>,
    ) -> Document {
        Document {
            id: Uuid::new_v4().to_string(),
            title: inbound
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
            path: placed.to_string_lossy().into_owned(),
            source_path: inbound
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            fingerprint: fingerprint.to_string(),
            doc_type: extension_of(inbound),
            project_id: project_id.map(|p| p.to_string()),
            num_pages: 0,
            status: DocumentStatus::Uploaded,
            subject: None,
            author: None,
            created_date: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Best-effort detector pass over all chunks. A detector error loses
    /// that chunk's artifacts, never the chunk.
    fn detect_artifacts(&self, doc: &Document, chunks: &[Chunk]) -> ChunkArtifacts {
        let mut artifacts = ChunkArtifacts::default();
        for chunk in chunks {
            match self.timeline.extract(&chunk.text, &chunk.id, &doc.id) {
                Ok((mentions, events)) => {
                    artifacts.date_mentions.extend(mentions);
                    artifacts.events.extend(events);
                }
                Err(err) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %err, "timeline detection failed");
                }
            }
            match self.sensitive.detect(&chunk.text) {
                Ok(hits) => {
                    artifacts
                        .sensitive_matches
                        .extend(hits.into_iter().map(|m| SensitiveDataMatch {
                            id: Uuid::new_v4().to_string(),
                            chunk_id: chunk.id.clone(),
                            document_id: doc.id.clone(),
                            pattern_type: m.pattern_type,
                            match_text: m.match_text,
                            confidence: m.confidence,
                            start_pos: m.start_pos as i64,
                            end_pos: m.end_pos as i64,
                            context_before: m.context_before,
                            context_after: m.context_after,
                        }));
                }
                Err(err) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %err, "sensitive-data detection failed");
                }
            }
        }
        artifacts
    }

    /// Lost the dedup race at commit time. The file already sits at the
    /// shared content-addressed path, so only the row lookup remains.
    async fn lost_race(&self, fingerprint: &str, placed: &Path) -> Result<IngestOutcome> {
        let existing = self
            .store
            .find_by_fingerprint(fingerprint)
            .await?
            .unwrap_or_default();
        tracing::info!(document_id = %existing, "lost dedup race at commit");
        Ok(IngestOutcome::Duplicate {
            existing_document_id: existing,
            moved_to: placed.to_path_buf(),
        })
    }
}

/// Aggregate counts for a batch run, printed by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub embedded: usize,
    pub handed_off: usize,
    pub duplicates: usize,
    pub quarantined: usize,
}

impl IngestReport {
    fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Embedded { .. } => self.embedded += 1,
            IngestOutcome::HandedOff { .. } => self.handed_off += 1,
            IngestOutcome::Duplicate { .. } => self.duplicates += 1,
            IngestOutcome::Quarantined { .. } => self.quarantined += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.embedded + self.handed_off + self.duplicates + self.quarantined
    }
}

/// Ingests a single file or every file under a directory, skipping the
/// `processed/` and `failed/` holding areas and their logs.
pub async fn run_ingest(
    pipeline: &IngestPipeline,
    path: &Path,
    project_id: Option<&str>,
    ocr_mode: Option<OcrMode>,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    if path.is_file() {
        let outcome = pipeline.ingest(path, project_id, ocr_mode).await?;
        report.record(&outcome);
        return Ok(report);
    }
    if !path.is_dir() {
        anyhow::bail!("No such file or directory: {}", path.display());
    }

    for entry in WalkDir::new(path).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || skip_entry(entry.path(), path) {
            continue;
        }
        let outcome = pipeline.ingest(entry.path(), project_id, ocr_mode).await?;
        report.record(&outcome);
    }
    Ok(report)
}

/// Holding areas created by earlier runs are not inputs.
fn skip_entry(file: &Path, root: &Path) -> bool {
    if file.file_name().is_some_and(|n| n == "errors.log") {
        return true;
    }
    file.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .any(|c| c.as_os_str() == "processed" || c.as_os_str() == "failed")
        })
        .unwrap_or(false)
}
