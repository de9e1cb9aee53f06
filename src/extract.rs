//! Text extraction for profile documents (PDF, DOCX, TXT, Markdown, JSON).
//!
//! The file type is chosen by extension. Each extractor returns plain UTF-8
//! text plus a small JSON object of format-specific metadata. Failures are
//! returned, never panicked on; the document store skips the file.

use std::io::Read;
use std::path::Path;

use serde_json::{json, Value};

/// Extensions the document store knows how to read.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "docx", "txt", "md", "json"];

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("invalid JSON document: {0}")]
    Json(String),
}

/// Text and metadata pulled out of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub metadata: Value,
}

/// Lowercased extension of `path`, if any.
pub fn file_type(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    file_type(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Reads `path` and extracts its text according to its extension.
pub fn extract_file(path: &Path) -> Result<Extracted, ExtractError> {
    let ext = file_type(path).unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ExtractError::UnsupportedFileType(if ext.is_empty() {
            path.display().to_string()
        } else {
            ext
        }));
    }
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_bytes(&bytes, &ext)
}

/// Extracts text from in-memory content of the given file type.
pub fn extract_bytes(bytes: &[u8], file_type: &str) -> Result<Extracted, ExtractError> {
    match file_type {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "txt" => Ok(extract_txt(bytes)),
        "md" => Ok(extract_markdown(bytes)),
        "json" => extract_json(bytes),
        other => Err(ExtractError::UnsupportedFileType(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    // pdf-extract panics on some malformed inputs
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractError::Pdf("PDF parser panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let text = text.trim().to_string();
    Ok(Extracted {
        metadata: json!({ "characters": text.chars().count() }),
        text,
    })
}

fn extract_docx(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    let paragraphs = docx_paragraphs(&doc_xml)?;
    Ok(Extracted {
        metadata: json!({ "paragraphs": paragraphs.len() }),
        text: paragraphs.join("\n"),
    })
}

/// Non-empty `w:p` paragraphs, each the concatenation of its `w:t` runs.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let trailing = current.trim();
    if !trailing.is_empty() {
        paragraphs.push(trailing.to_string());
    }
    Ok(paragraphs)
}

fn extract_txt(bytes: &[u8]) -> Extracted {
    let (text, encoding) = match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), "utf-8"),
        // Latin-1 maps every byte to the code point of the same value
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), "latin-1"),
    };
    Extracted {
        metadata: json!({
            "encoding": encoding,
            "lines": text.lines().count(),
            "words": text.split_whitespace().count(),
            "characters": text.chars().count(),
        }),
        text,
    }
}

fn extract_markdown(bytes: &[u8]) -> Extracted {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let headers: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .collect();
    Extracted {
        metadata: json!({
            "format": "markdown",
            "lines": text.lines().count(),
            "headers": headers,
        }),
        text,
    }
}

fn extract_json(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ExtractError::Json(e.to_string()))?;
    let text = serde_json::to_string_pretty(&value).map_err(|e| ExtractError::Json(e.to_string()))?;

    let (kind, keys, size) = match &value {
        Value::Object(map) => ("object", map.keys().cloned().collect(), map.len()),
        Value::Array(items) => ("array", Vec::new(), items.len()),
        _ => ("scalar", Vec::new(), 1),
    };
    Ok(Extracted {
        metadata: json!({ "format": "json", "type": kind, "keys": keys, "size": size }),
        text,
    })
}
