//! Core data models for the ingestion pipeline.
//!
//! These types represent the documents, minidocs, chunks, and derived
//! artifacts that flow through ingestion and on to the downstream
//! splitting, OCR, and embedding stages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`Document`].
///
/// The ingestion core only ever produces `Uploaded` (conversion branch
/// hand-off) or `Embedded` (text-native branch, chunks committed and
/// embed jobs dispatched). Downstream stages advance statuses further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Embedded,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Embedded => "embedded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "processing" => Some(DocumentStatus::Processing),
            "embedded" => Some(DocumentStatus::Embedded),
            _ => None,
        }
    }
}

/// One row per distinct uploaded file, unique by content fingerprint.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Original filename as uploaded.
    pub title: String,
    /// Permanent content-addressed path.
    pub path: String,
    /// Directory the file was ingested from.
    pub source_path: String,
    /// SHA-256 of the full byte content, lowercase hex.
    pub fingerprint: String,
    /// Lowercase extension including the leading dot, e.g. `.docx`.
    pub doc_type: String,
    pub project_id: Option<String>,
    pub num_pages: i64,
    pub status: DocumentStatus,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub created_at: i64,
}

/// A contiguous page-range sub-unit of a document, processed as a unit.
///
/// The text-native branch creates exactly one minidoc covering the whole
/// single logical page.
#[derive(Debug, Clone)]
pub struct MiniDoc {
    pub id: String,
    pub document_id: String,
    /// Derived identifier: `{fingerprint}__text_{seq}`.
    pub minidoc_id: String,
    pub page_start: i64,
    pub page_end: i64,
    pub status: String,
}

/// Ordered, overlapping slice of a document's extracted text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
}

/// A date reference found inside a chunk by the timeline detector.
#[derive(Debug, Clone)]
pub struct DateMention {
    pub id: String,
    pub chunk_id: String,
    pub document_id: String,
    pub mention_text: String,
    /// Char offset of the mention within the chunk text.
    pub position: i64,
}

/// An event candidate (date plus surrounding context) for the timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub id: String,
    pub chunk_id: String,
    pub document_id: String,
    pub event_date: String,
    pub description: String,
}

/// A sensitive-data pattern hit inside a chunk.
#[derive(Debug, Clone)]
pub struct SensitiveDataMatch {
    pub id: String,
    pub chunk_id: String,
    pub document_id: String,
    pub pattern_type: String,
    pub match_text: String,
    pub confidence: f64,
    pub start_pos: i64,
    pub end_pos: i64,
    pub context_before: String,
    pub context_after: String,
}

/// Best-effort detector output collected across all chunks of one
/// document, committed in the same transaction as the chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkArtifacts {
    pub date_mentions: Vec<DateMention>,
    pub events: Vec<TimelineEvent>,
    pub sensitive_matches: Vec<SensitiveDataMatch>,
}

/// OCR trade-off selected by the caller and carried opaquely in the
/// split job payload. `Fast` favors throughput, `Accurate` quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    #[default]
    Fast,
    Accurate,
}

impl std::str::FromStr for OcrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(OcrMode::Fast),
            "accurate" => Ok(OcrMode::Accurate),
            other => Err(format!(
                "unknown OCR mode: '{}'. Must be fast or accurate.",
                other
            )),
        }
    }
}

impl std::fmt::Display for OcrMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrMode::Fast => write!(f, "fast"),
            OcrMode::Accurate => write!(f, "accurate"),
        }
    }
}

/// Generic document metadata fields that source-specific extractor keys
/// map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocField {
    Subject,
    Author,
    CreatedDate,
}

/// Mapping from source-specific metadata keys to generic document
/// fields. An email's `From` header and a docx core-properties creator
/// both land in `author`; the schema stays self-documenting.
pub const METADATA_FIELD_MAP: &[(&str, DocField)] = &[
    ("email_subject", DocField::Subject),
    ("doc_subject", DocField::Subject),
    ("email_from", DocField::Author),
    ("doc_author", DocField::Author),
    ("email_date", DocField::CreatedDate),
    ("doc_created", DocField::CreatedDate),
];

/// Copies extractor metadata into the document's generic fields via
/// [`METADATA_FIELD_MAP`]. First non-empty key wins per field. A
/// malformed date is omitted, never fatal.
pub fn apply_metadata(doc: &mut Document, metadata: &HashMap<String, String>) {
    for (key, field) in METADATA_FIELD_MAP {
        let Some(value) = metadata.get(*key).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        match field {
            DocField::Subject => {
                if doc.subject.is_none() {
                    doc.subject = Some(value.clone());
                }
            }
            DocField::Author => {
                if doc.author.is_none() {
                    doc.author = Some(value.clone());
                }
            }
            DocField::CreatedDate => {
                if doc.created_date.is_none() {
                    doc.created_date = parse_date(value);
                }
            }
        }
    }
}

/// Parses RFC 2822 (email `Date:` headers) or RFC 3339 timestamps.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_document() -> Document {
        Document {
            id: "d1".to_string(),
            title: "mail.eml".to_string(),
            path: "/silo/abc_mail.eml".to_string(),
            source_path: "/inbox".to_string(),
            fingerprint: "abc".to_string(),
            doc_type: ".eml".to_string(),
            project_id: None,
            num_pages: 1,
            status: DocumentStatus::Processing,
            subject: None,
            author: None,
            created_date: None,
            created_at: 0,
        }
    }

    #[test]
    fn email_headers_map_to_generic_fields() {
        let mut doc = blank_document();
        let mut meta = HashMap::new();
        meta.insert("email_subject".to_string(), "Quarterly report".to_string());
        meta.insert("email_from".to_string(), "alice@example.com".to_string());
        meta.insert(
            "email_date".to_string(),
            "Tue, 1 Jul 2025 10:52:37 +0200".to_string(),
        );
        apply_metadata(&mut doc, &meta);
        assert_eq!(doc.subject.as_deref(), Some("Quarterly report"));
        assert_eq!(doc.author.as_deref(), Some("alice@example.com"));
        assert!(doc.created_date.is_some());
    }

    #[test]
    fn malformed_date_is_omitted() {
        let mut doc = blank_document();
        let mut meta = HashMap::new();
        meta.insert("email_date".to_string(), "not a date".to_string());
        apply_metadata(&mut doc, &meta);
        assert!(doc.created_date.is_none());
    }

    #[test]
    fn docx_properties_use_same_fields() {
        let mut doc = blank_document();
        let mut meta = HashMap::new();
        meta.insert("doc_author".to_string(), "Bob".to_string());
        meta.insert(
            "doc_created".to_string(),
            "2024-03-01T09:00:00Z".to_string(),
        );
        apply_metadata(&mut doc, &meta);
        assert_eq!(doc.author.as_deref(), Some("Bob"));
        assert!(doc.created_date.is_some());
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut doc = blank_document();
        let mut meta = HashMap::new();
        meta.insert("email_subject".to_string(), "  ".to_string());
        apply_metadata(&mut doc, &meta);
        assert!(doc.subject.is_none());
    }

    #[test]
    fn status_round_trips() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Processing,
            DocumentStatus::Embedded,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("parsed"), None);
    }
}
