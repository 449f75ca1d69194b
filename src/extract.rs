//! Text-native classification and direct text extraction.
//!
//! Files whose content is extractable without optical recognition (plain
//! text, markup, `.docx`, `.eml`) take the text branch and skip the OCR
//! pipeline entirely. Extraction returns an explicit [`ExtractOutcome`]
//! so the fallback to the conversion branch is a visible data value,
//! not an exception handler side effect.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Extensions whose content is directly extractable without OCR.
pub const TEXT_NATIVE_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".xml", ".csv", ".html", ".htm", ".eml", ".emlx", ".docx",
];

/// Maximum decompressed bytes read from a single docx ZIP entry
/// (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Lowercase extension of a path, including the leading dot.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Whether a file takes the text-native branch, by extension.
pub fn is_text_native(path: &Path) -> bool {
    TEXT_NATIVE_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Text plus source-specific metadata produced by an extractor.
///
/// Metadata keys follow the conventions consumed by
/// [`crate::models::METADATA_FIELD_MAP`] (`email_subject`, `doc_author`, ...).
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// Result of a text extraction attempt. `Empty` and `Failed` both route
/// the file to the conversion branch instead of failing the attempt.
#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Extracted(ExtractedText),
    Empty,
    Failed(String),
}

/// Text-extraction collaborator consumed by the pipeline.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> ExtractOutcome;
}

/// Built-in extractor covering the text-native extension set.
#[derive(Debug, Default)]
pub struct BuiltinExtractor;

impl TextExtractor for BuiltinExtractor {
    fn extract(&self, path: &Path) -> ExtractOutcome {
        let result = match extension_of(path).as_str() {
            ".txt" | ".md" | ".json" | ".xml" | ".csv" => extract_plain(path),
            ".html" | ".htm" => extract_html(path),
            ".eml" => extract_eml(path),
            ".emlx" => extract_emlx(path),
            ".docx" => extract_docx(path),
            other => Err(format!("no text extractor for '{}'", other)),
        };
        match result {
            Ok(extracted) if extracted.text.trim().is_empty() => ExtractOutcome::Empty,
            Ok(extracted) => ExtractOutcome::Extracted(extracted),
            Err(reason) => ExtractOutcome::Failed(reason),
        }
    }
}

fn read_lossy(path: &Path) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("read {}: {}", path.display(), e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn extract_plain(path: &Path) -> Result<ExtractedText, String> {
    Ok(ExtractedText {
        text: read_lossy(path)?,
        metadata: HashMap::new(),
    })
}

fn extract_html(path: &Path) -> Result<ExtractedText, String> {
    Ok(ExtractedText {
        text: strip_html(&read_lossy(path)?),
        metadata: HashMap::new(),
    })
}

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strips markup from HTML, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let no_scripts = SCRIPT_STYLE.replace_all(html, "");
    let no_tags = TAGS.replace_all(&no_scripts, " ");
    WS.replace_all(&no_tags, " ").trim().to_string()
}

fn extract_eml(path: &Path) -> Result<ExtractedText, String> {
    parse_email(&read_lossy(path)?)
}

/// Extracts an Apple Mail `.emlx` file: a decimal byte-count line, then
/// the RFC 822 message itself, then an XML plist trailer. The count line
/// bounds the message so the trailer never leaks into the text; a file
/// without a count line is treated as a bare email.
fn extract_emlx(path: &Path) -> Result<ExtractedText, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("read {}: {}", path.display(), e))?;
    let first_newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| "invalid emlx: no newline found".to_string())?;
    let count = std::str::from_utf8(&bytes[..first_newline])
        .ok()
        .and_then(|line| line.trim().parse::<usize>().ok());
    let message = match count {
        Some(count) => {
            let start = first_newline + 1;
            let end = (start + count).min(bytes.len());
            &bytes[start..end]
        }
        None => bytes.as_slice(),
    };
    parse_email(&String::from_utf8_lossy(message))
}

/// Parses an RFC 822 email: headers become metadata, and the searchable
/// text is a header block followed by the body. An HTML body is stripped
/// to plain text.
fn parse_email(raw: &str) -> Result<ExtractedText, String> {
    let normalized = raw.replace("\r\n", "\n");
    let (header_block, body) = match normalized.find("\n\n") {
        Some(split) => (&normalized[..split], &normalized[split + 2..]),
        None => (normalized.as_str(), ""),
    };

    let headers = parse_headers(header_block);
    let mut metadata = HashMap::new();
    for (header, key) in [
        ("subject", "email_subject"),
        ("from", "email_from"),
        ("to", "email_to"),
        ("cc", "email_cc"),
        ("date", "email_date"),
        ("message-id", "email_message_id"),
        ("in-reply-to", "email_in_reply_to"),
    ] {
        if let Some(v) = headers.get(header) {
            metadata.insert(key.to_string(), v.clone());
        }
    }

    let content_type = headers.get("content-type").cloned().unwrap_or_default();
    let body = if content_type.to_lowercase().contains("text/html") {
        strip_html(body)
    } else {
        body.to_string()
    };

    let get = |k: &str| metadata.get(k).cloned().unwrap_or_default();
    let text = format!(
        "Subject: {}\nFrom: {}\nTo: {}\nCC: {}\nDate: {}\n\n{}",
        get("email_subject"),
        get("email_from"),
        get("email_to"),
        get("email_cc"),
        get("email_date"),
        body
    );

    Ok(ExtractedText { text, metadata })
}

/// Parses an RFC 822 header block, unfolding continuation lines. Header
/// names are lowercased.
fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut current: Option<(String, String)> = None;
    for line in block.lines() {
        if (line.starts_with(' ') || line.starts_with('\t')) && current.is_some() {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }
    headers
}

/// Extracts docx body text (`w:t` runs of `word/document.xml`) plus core
/// properties (`docProps/core.xml`) as metadata.
fn extract_docx(path: &Path) -> Result<ExtractedText, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("read {}: {}", path.display(), e))?;
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice())).map_err(|e| e.to_string())?;

    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    let text = collect_text_elements(&doc_xml, b"t")?;

    let mut metadata = HashMap::new();
    if let Ok(core_xml) = read_zip_entry_bounded(&mut archive, "docProps/core.xml") {
        for (element, key) in [
            (b"subject".as_slice(), "doc_subject"),
            (b"creator".as_slice(), "doc_author"),
            (b"created".as_slice(), "doc_created"),
        ] {
            if let Ok(value) = collect_text_elements(&core_xml, element) {
                if !value.trim().is_empty() {
                    metadata.insert(key.to_string(), value.trim().to_string());
                }
            }
        }
    }

    Ok(ExtractedText { text, metadata })
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!("ZIP entry {} exceeds size limit", name));
    }
    Ok(out)
}

/// Concatenates the text content of all elements with the given local
/// name, separating runs with newlines.
fn collect_text_elements(xml: &[u8], local: &[u8]) -> Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_target = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == local {
                    in_target = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_target => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == local {
                    in_target = false;
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_docx(path: &Path, body: &str, creator: Option<&str>) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("word/document.xml", opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>"#,
            body
        )
        .unwrap();
        if let Some(creator) = creator {
            zip.start_file("docProps/core.xml", opts).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:creator>{}</dc:creator></cp:coreProperties>"#,
                creator
            )
            .unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn classifies_text_native_extensions() {
        assert!(is_text_native(Path::new("a/notes.TXT")));
        assert!(is_text_native(Path::new("mail.eml")));
        assert!(is_text_native(Path::new("mail.emlx")));
        assert!(is_text_native(Path::new("report.docx")));
        assert!(!is_text_native(Path::new("outlook.msg")));
        assert!(!is_text_native(Path::new("scan.pdf")));
        assert!(!is_text_native(Path::new("photo.jpg")));
        assert!(!is_text_native(Path::new("mystery.xyz")));
    }

    #[test]
    fn plain_text_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("notes.txt");
        std::fs::write(&p, "line one\nline two").unwrap();
        match BuiltinExtractor.extract(&p) {
            ExtractOutcome::Extracted(e) => assert_eq!(e.text, "line one\nline two"),
            other => panic!("expected Extracted, got {:?}", other),
        }
    }

    #[test]
    fn whitespace_only_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("blank.txt");
        std::fs::write(&p, "   \n\t\n").unwrap();
        assert!(matches!(BuiltinExtractor.extract(&p), ExtractOutcome::Empty));
    }

    #[test]
    fn html_is_stripped() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("page.html");
        std::fs::write(
            &p,
            "<html><head><style>b{}</style></head><body><p>Hello <b>world</b></p></body></html>",
        )
        .unwrap();
        match BuiltinExtractor.extract(&p) {
            ExtractOutcome::Extracted(e) => assert_eq!(e.text, "Hello world"),
            other => panic!("expected Extracted, got {:?}", other),
        }
    }

    #[test]
    fn eml_headers_become_metadata_and_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("mail.eml");
        std::fs::write(
            &p,
            "From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Budget\r\n spring\r\nDate: Tue, 1 Jul 2025 10:52:37 +0200\r\n\r\nPlease find attached.\r\n",
        )
        .unwrap();
        match BuiltinExtractor.extract(&p) {
            ExtractOutcome::Extracted(e) => {
                assert_eq!(e.metadata.get("email_subject").unwrap(), "Budget spring");
                assert_eq!(e.metadata.get("email_from").unwrap(), "alice@example.com");
                assert!(e.text.starts_with("Subject: Budget spring\n"));
                assert!(e.text.contains("Please find attached."));
            }
            other => panic!("expected Extracted, got {:?}", other),
        }
    }

    #[test]
    fn emlx_count_line_and_plist_trailer_are_stripped() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("message.emlx");
        let message = "From: alice@example.com\nSubject: Lunch\n\nNoon works for me.";
        let plist = r#"<?xml version="1.0"?><plist version="1.0"><dict><key>flags</key><integer>0</integer></dict></plist>"#;
        std::fs::write(&p, format!("{}\n{}{}", message.len(), message, plist)).unwrap();

        match BuiltinExtractor.extract(&p) {
            ExtractOutcome::Extracted(e) => {
                assert_eq!(e.metadata.get("email_subject").unwrap(), "Lunch");
                assert_eq!(e.metadata.get("email_from").unwrap(), "alice@example.com");
                assert!(e.text.contains("Noon works for me."));
                assert!(!e.text.contains("plist"));
            }
            other => panic!("expected Extracted, got {:?}", other),
        }
    }

    #[test]
    fn emlx_without_count_line_is_parsed_as_bare_email() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("message.emlx");
        std::fs::write(&p, "From: bob@example.com\nSubject: Hi\n\nShort body.").unwrap();

        match BuiltinExtractor.extract(&p) {
            ExtractOutcome::Extracted(e) => {
                assert_eq!(e.metadata.get("email_subject").unwrap(), "Hi");
                assert!(e.text.contains("Short body."));
            }
            other => panic!("expected Extracted, got {:?}", other),
        }
    }

    #[test]
    fn docx_body_and_creator_extracted() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("report.docx");
        write_minimal_docx(&p, "Findings of the review.", Some("Carol"));
        match BuiltinExtractor.extract(&p) {
            ExtractOutcome::Extracted(e) => {
                assert_eq!(e.text, "Findings of the review.");
                assert_eq!(e.metadata.get("doc_author").unwrap(), "Carol");
            }
            other => panic!("expected Extracted, got {:?}", other),
        }
    }

    #[test]
    fn corrupt_docx_is_failed_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("broken.docx");
        std::fs::write(&p, b"not a zip").unwrap();
        assert!(matches!(
            BuiltinExtractor.extract(&p),
            ExtractOutcome::Failed(_)
        ));
    }
}
