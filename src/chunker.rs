//! Overlapping fixed-window text chunker.
//!
//! Splits extracted text into windows of `window` chars advancing by
//! `window - overlap`, so successive full-length chunks share an
//! `overlap`-char suffix/prefix. Indices are contiguous from 0 and the
//! final partial window is included. For a text of L chars this yields
//! `ceil(L / (window - overlap))` chunks.

use uuid::Uuid;

use crate::models::Chunk;

/// Default chunk window, in chars.
pub const DEFAULT_WINDOW: usize = 512;
/// Default overlap between successive chunks, in chars.
pub const DEFAULT_OVERLAP: usize = 50;

/// Splits `text` into ordered overlapping chunks for `document_id`.
///
/// `window` must be greater than `overlap` (enforced at config load).
/// Empty text yields no chunks; the text-native branch falls back to
/// conversion before ever chunking an empty extraction.
pub fn chunk_text(document_id: &str, text: &str, window: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(window > overlap);
    let stride = window - overlap;
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + window).min(chars.len());
        chunks.push(Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: chunks.len() as i64,
            text: chars[start..end].iter().collect(),
        });
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 512, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("doc1", "", 512, 50).is_empty());
    }

    #[test]
    fn thousand_chars_three_chunks() {
        let text: String = std::iter::repeat('a').take(1000).collect();
        let chunks = chunk_text("doc1", &text, 512, 50);
        // Stride 462: windows at 0, 462, 924.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 512);
        assert_eq!(chunks[1].text.chars().count(), 512);
        assert_eq!(chunks[2].text.chars().count(), 76);
    }

    #[test]
    fn indices_contiguous_from_zero() {
        let text: String = (0..3000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text("doc1", &text, 512, 50);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn successive_full_chunks_share_overlap() {
        let text: String = (0..2000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text("doc1", &text, 512, 50);
        for pair in chunks.windows(2) {
            if pair[0].text.chars().count() == 512 && pair[1].text.chars().count() == 512 {
                let tail: String = pair[0].text.chars().skip(512 - 50).collect();
                let head: String = pair[1].text.chars().take(50).collect();
                assert_eq!(tail, head);
            }
        }
    }

    #[test]
    fn chunk_count_matches_ceiling_formula() {
        for len in [1usize, 461, 462, 463, 512, 924, 925, 5000] {
            let text: String = std::iter::repeat('x').take(len).collect();
            let chunks = chunk_text("doc1", &text, 512, 50);
            assert_eq!(chunks.len(), len.div_ceil(462), "len={}", len);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text: String = std::iter::repeat('é').take(600).collect();
        let chunks = chunk_text("doc1", &text, 512, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 512);
        assert_eq!(chunks[1].text.chars().count(), 138);
    }
}
