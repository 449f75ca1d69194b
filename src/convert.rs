//! PDF conversion for files headed to the OCR branch.
//!
//! Non-text-native files (and text-native files whose extraction came up
//! empty) are normalized to a page-image-bearing PDF before the
//! splitting/OCR stage. The [`PdfConverter`] trait is the seam; the
//! built-in [`LopdfConverter`] renders extractable text into simple text
//! runs and embeds JPEGs directly via `DCTDecode`.

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use thiserror::Error;

use crate::extract::{extension_of, is_text_native, ExtractOutcome, TextExtractor};

const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const MARGIN: f64 = 40.0;
const LEADING: f64 = 12.0;
const WRAP_CHARS: usize = 90;

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

/// Conversion failure. `Unsupported` is permanent: the pipeline
/// quarantines the file immediately and enqueues nothing.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported file type for conversion: {0}")]
    Unsupported(String),
    #[error("conversion failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// PDF-conversion collaborator consumed by the pipeline. Produces a file
/// suitable for the downstream OCR stage and returns its path.
pub trait PdfConverter: Send + Sync {
    fn convert(&self, path: &Path) -> Result<PathBuf, ConvertError>;
}

/// Built-in converter: text-renderable formats become single-font text
/// PDFs; `.jpg`/`.jpeg` are embedded losslessly as `DCTDecode` image
/// XObjects. Anything else is `Unsupported`.
pub struct LopdfConverter<E> {
    extractor: E,
}

impl<E: TextExtractor> LopdfConverter<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }
}

impl<E: TextExtractor> PdfConverter for LopdfConverter<E> {
    fn convert(&self, path: &Path) -> Result<PathBuf, ConvertError> {
        let ext = extension_of(path);
        let mut out_path = path.as_os_str().to_owned();
        out_path.push(".converted.pdf");
        let out_path = PathBuf::from(out_path);

        let result = match ext.as_str() {
            _ if is_text_native(path) => self.convert_text(path, &out_path),
            ".jpg" | ".jpeg" => convert_jpeg(path, &out_path),
            other => Err(ConvertError::Unsupported(other.to_string())),
        };

        if result.is_err() && out_path.exists() {
            // A failed conversion must not leave a partial PDF behind.
            let _ = std::fs::remove_file(&out_path);
        }
        result.map(|()| out_path)
    }
}

impl<E: TextExtractor> LopdfConverter<E> {
    fn convert_text(&self, path: &Path, out_path: &Path) -> Result<(), ConvertError> {
        let text = match self.extractor.extract(path) {
            ExtractOutcome::Extracted(e) => e.text,
            ExtractOutcome::Empty => String::new(),
            ExtractOutcome::Failed(reason) => return Err(ConvertError::Failed(reason)),
        };
        write_text_pdf(&text, out_path)
    }
}

/// Renders text into a Helvetica-only PDF, wrapping at [`WRAP_CHARS`]
/// chars and paginating at the bottom margin.
fn write_text_pdf(text: &str, out_path: &Path) -> Result<(), ConvertError> {
    let lines: Vec<String> = text.lines().flat_map(wrap_line).collect();
    let lines_per_page = (((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize).max(1);

    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(lines_per_page).collect()
    };
    for page_lines in &pages {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("TL", vec![real(LEADING)]),
            Operation::new("Td", vec![real(MARGIN), real(PAGE_HEIGHT - MARGIN - LEADING)]),
        ];
        for line in *page_lines {
            ops.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new("ET", vec![]));

        let content = Content { operations: ops };
        let encoded = content
            .encode()
            .map_err(|e| ConvertError::Failed(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(out_path)
        .map_err(|e| ConvertError::Failed(e.to_string()))?;
    Ok(())
}

fn wrap_line(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(WRAP_CHARS)
        .map(|c| c.iter().collect())
        .collect()
}

/// Embeds a JPEG as a single-page PDF without re-encoding, scaled to fit
/// inside the page margins.
fn convert_jpeg(path: &Path, out_path: &Path) -> Result<(), ConvertError> {
    let bytes = std::fs::read(path)?;
    let (width, height, components) = jpeg_dimensions(&bytes)
        .ok_or_else(|| ConvertError::Failed("could not parse JPEG dimensions".to_string()))?;
    let color_space = if components == 1 {
        "DeviceGray"
    } else {
        "DeviceRGB"
    };

    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes,
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    let scale = ((PAGE_WIDTH - 2.0 * MARGIN) / width as f64)
        .min((PAGE_HEIGHT - 2.0 * MARGIN) / height as f64)
        .min(1.0);
    let draw_w = width as f64 * scale;
    let draw_h = height as f64 * scale;
    let y = PAGE_HEIGHT - MARGIN - draw_h;

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(draw_w),
                    0.into(),
                    0.into(),
                    real(draw_h),
                    real(MARGIN),
                    real(y),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content
        .encode()
        .map_err(|e| ConvertError::Failed(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(out_path)
        .map_err(|e| ConvertError::Failed(e.to_string()))?;
    Ok(())
}

/// Reads (width, height, components) from a JPEG's start-of-frame marker.
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u16, u16, u8)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // Standalone markers have no length segment.
        if (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if i + 9 >= bytes.len() {
                return None;
            }
            let height = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]);
            let width = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]);
            let components = bytes[i + 9];
            return Some((width, height, components));
        }
        i += 2 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BuiltinExtractor;

    #[test]
    fn text_file_converts_to_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("notes.txt");
        std::fs::write(&p, "A short memo.\nSecond line.").unwrap();

        let converter = LopdfConverter::new(BuiltinExtractor);
        let out = converter.convert(&p).unwrap();
        assert_eq!(out, tmp.path().join("notes.txt.converted.pdf"));
        let pdf = std::fs::read(&out).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn long_text_paginates() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("long.txt");
        let text: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&p, text).unwrap();

        let converter = LopdfConverter::new(BuiltinExtractor);
        let out = converter.convert(&p).unwrap();
        let doc = Document::load(&out).unwrap();
        assert!(doc.get_pages().len() >= 2);
    }

    #[test]
    fn unsupported_extension_is_permanent_error() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("mystery.xyz");
        std::fs::write(&p, b"??").unwrap();

        let converter = LopdfConverter::new(BuiltinExtractor);
        match converter.convert(&p) {
            Err(ConvertError::Unsupported(ext)) => assert_eq!(ext, ".xyz"),
            other => panic!("expected Unsupported, got {:?}", other.map(|p| p.display().to_string())),
        }
        assert!(!tmp.path().join("mystery.xyz.converted.pdf").exists());
    }

    #[test]
    fn jpeg_dimensions_parse_sof0() {
        // Minimal SOF0 segment: FFD8, then FFC0 with 8-bit precision, 600x800, 3 components.
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x02, 0x58, 0x03, 0x20, 0x03]);
        jpeg.extend_from_slice(&[0; 16]);
        let (w, h, c) = jpeg_dimensions(&jpeg).unwrap();
        assert_eq!((w, h, c), (800, 600, 3));
    }

    #[test]
    fn truncated_jpeg_is_rejected() {
        assert!(jpeg_dimensions(&[0xFF, 0xD8, 0xFF]).is_none());
        assert!(jpeg_dimensions(b"not a jpeg").is_none());
    }
}
