//! Best-effort per-chunk detectors: timeline extraction and
//! sensitive-data pattern matching.
//!
//! Both are external collaborators from the pipeline's point of view; a
//! detector error on one chunk is logged and skipped, never aborting the
//! chunk or the document. The built-in implementations are regex-based.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::models::{DateMention, TimelineEvent};

/// A sensitive-data hit before it is keyed to a chunk and document.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern_type: String,
    pub match_text: String,
    pub confidence: f64,
    pub start_pos: usize,
    pub end_pos: usize,
    pub context_before: String,
    pub context_after: String,
}

/// Timeline-extraction collaborator: date mentions and event candidates
/// found in one chunk.
pub trait TimelineDetector: Send + Sync {
    fn extract(
        &self,
        chunk_text: &str,
        chunk_id: &str,
        document_id: &str,
    ) -> Result<(Vec<DateMention>, Vec<TimelineEvent>)>;
}

/// Sensitive-data detection collaborator.
pub trait SensitiveDataDetector: Send + Sync {
    fn detect(&self, chunk_text: &str) -> Result<Vec<PatternMatch>>;
}

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap(),
        Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").unwrap(),
        Regex::new(
            r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s+\d{4}\b",
        )
        .unwrap(),
    ]
});

/// Chars of context captured on either side of a hit.
const CONTEXT_CHARS: usize = 30;

/// Regex-backed timeline detector. Every date hit yields a mention; the
/// sentence around the hit becomes an event candidate.
#[derive(Debug, Default)]
pub struct RegexTimelineDetector;

impl TimelineDetector for RegexTimelineDetector {
    fn extract(
        &self,
        chunk_text: &str,
        chunk_id: &str,
        document_id: &str,
    ) -> Result<(Vec<DateMention>, Vec<TimelineEvent>)> {
        let mut mentions = Vec::new();
        let mut events = Vec::new();
        for pattern in DATE_PATTERNS.iter() {
            for m in pattern.find_iter(chunk_text) {
                let position = chunk_text[..m.start()].chars().count() as i64;
                mentions.push(DateMention {
                    id: Uuid::new_v4().to_string(),
                    chunk_id: chunk_id.to_string(),
                    document_id: document_id.to_string(),
                    mention_text: m.as_str().to_string(),
                    position,
                });
                events.push(TimelineEvent {
                    id: Uuid::new_v4().to_string(),
                    chunk_id: chunk_id.to_string(),
                    document_id: document_id.to_string(),
                    event_date: m.as_str().to_string(),
                    description: sentence_around(chunk_text, m.start(), m.end()),
                });
            }
        }
        Ok((mentions, events))
    }
}

/// The sentence containing `[start, end)`, bounded by `.`, `!`, `?`, or
/// newlines, trimmed.
fn sentence_around(text: &str, start: usize, end: usize) -> String {
    let is_boundary = |c: char| matches!(c, '.' | '!' | '?' | '\n');
    let sentence_start = text[..start]
        .rfind(is_boundary)
        .map(|i| i + text[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let sentence_end = text[end..]
        .find(is_boundary)
        .map(|i| end + i + 1)
        .unwrap_or(text.len());
    text[sentence_start..sentence_end].trim().to_string()
}

struct SensitivePattern {
    pattern_type: &'static str,
    regex: Regex,
    confidence: f64,
}

static SENSITIVE_PATTERNS: Lazy<Vec<SensitivePattern>> = Lazy::new(|| {
    vec![
        SensitivePattern {
            pattern_type: "email",
            regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            confidence: 0.9,
        },
        SensitivePattern {
            pattern_type: "ssn",
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            confidence: 0.85,
        },
        SensitivePattern {
            pattern_type: "phone",
            regex: Regex::new(r"\b(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b").unwrap(),
            confidence: 0.6,
        },
    ]
});

/// Regex-backed sensitive-data detector covering emails, SSN-shaped
/// numbers, and phone numbers.
#[derive(Debug, Default)]
pub struct RegexSensitiveDetector;

impl SensitiveDataDetector for RegexSensitiveDetector {
    fn detect(&self, chunk_text: &str) -> Result<Vec<PatternMatch>> {
        let mut matches = Vec::new();
        for pattern in SENSITIVE_PATTERNS.iter() {
            for m in pattern.regex.find_iter(chunk_text) {
                matches.push(PatternMatch {
                    pattern_type: pattern.pattern_type.to_string(),
                    match_text: m.as_str().to_string(),
                    confidence: pattern.confidence,
                    start_pos: chunk_text[..m.start()].chars().count(),
                    end_pos: chunk_text[..m.end()].chars().count(),
                    context_before: context_before(chunk_text, m.start()),
                    context_after: context_after(chunk_text, m.end()),
                });
            }
        }
        Ok(matches)
    }
}

fn context_before(text: &str, pos: usize) -> String {
    let chars: Vec<char> = text[..pos].chars().collect();
    chars[chars.len().saturating_sub(CONTEXT_CHARS)..]
        .iter()
        .collect()
}

fn context_after(text: &str, pos: usize) -> String {
    text[pos..].chars().take(CONTEXT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_iso_dates_with_context() {
        let text = "The hearing was held. It took place on 2024-03-15 in the main court. Nothing else.";
        let (mentions, events) = RegexTimelineDetector
            .extract(text, "c1", "d1")
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].mention_text, "2024-03-15");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].description,
            "It took place on 2024-03-15 in the main court."
        );
    }

    #[test]
    fn finds_written_month_dates() {
        let (mentions, _) = RegexTimelineDetector
            .extract("Signed on January 5, 2023 by both parties", "c1", "d1")
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].mention_text, "January 5, 2023");
    }

    #[test]
    fn no_dates_no_mentions() {
        let (mentions, events) = RegexTimelineDetector
            .extract("nothing dated in here", "c1", "d1")
            .unwrap();
        assert!(mentions.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn detects_email_addresses() {
        let text = "Contact alice@example.com for details";
        let matches = RegexSensitiveDetector.detect(text).unwrap();
        let email = matches.iter().find(|m| m.pattern_type == "email").unwrap();
        assert_eq!(email.match_text, "alice@example.com");
        assert_eq!(email.context_before, "Contact ");
        assert_eq!(email.context_after, " for details");
        assert!(email.confidence > 0.8);
    }

    #[test]
    fn detects_ssn_shape() {
        let matches = RegexSensitiveDetector
            .detect("SSN on file: 123-45-6789.")
            .unwrap();
        assert!(matches.iter().any(|m| m.pattern_type == "ssn"));
    }

    #[test]
    fn positions_are_char_offsets() {
        let text = "héllo 123-45-6789";
        let matches = RegexSensitiveDetector.detect(text).unwrap();
        let ssn = matches.iter().find(|m| m.pattern_type == "ssn").unwrap();
        assert_eq!(ssn.start_pos, 6);
        assert_eq!(ssn.end_pos, 17);
    }
}
