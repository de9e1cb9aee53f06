//! Multi-format document loading: DOCX, PDF, Markdown, plain text, and
//! JSON go through the same extraction pipeline; broken files are skipped.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

use folio::config::DocumentsConfig;
use folio::documents::DocumentStore;
use folio::extract::{self, ExtractError};

/// Minimal PDF with the text "portfolio test phrase", with correct xref
/// offsets so pdf-extract can at least parse its structure.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 53 >> stream\nBT /F1 12 Tf 100 700 Td (portfolio test phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal docx (ZIP) whose `word/document.xml` holds one paragraph per
/// entry of `paragraphs`.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn docs_config(dir: &Path) -> DocumentsConfig {
    DocumentsConfig {
        dir: dir.to_path_buf(),
        ..DocumentsConfig::default()
    }
}

#[test]
fn docx_paragraphs_are_extracted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("cv.docx");
    fs::write(&path, minimal_docx(&["Ada Example", "Staff engineer at Acme"])).unwrap();

    let extracted = extract::extract_file(&path).unwrap();
    assert_eq!(extracted.text, "Ada Example\nStaff engineer at Acme");
}

#[test]
fn corrupt_docx_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.docx");
    fs::write(&path, b"this is not a zip archive").unwrap();

    let err = extract::extract_file(&path).unwrap_err();
    assert!(matches!(err, ExtractError::Docx(_)), "got {:?}", err);
}

#[test]
fn pdf_never_panics() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("resume.pdf");
    fs::write(&path, minimal_pdf_with_phrase()).unwrap();

    // pdf-extract may or may not recover text from a hand-built PDF; either
    // way the result must be a value, not a crash.
    match extract::extract_file(&path) {
        Ok(extracted) => assert!(extracted.metadata.is_object()),
        Err(e) => assert!(matches!(e, ExtractError::Pdf(_)), "got {:?}", e),
    }
}

#[test]
fn unsupported_extension_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("photo.png");
    fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

    assert!(!extract::is_supported(&path));
    assert!(matches!(
        extract::extract_file(&path),
        Err(ExtractError::UnsupportedFileType(_))
    ));
}

#[tokio::test]
async fn mixed_directory_loads_and_skips_failures() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("docs");
    fs::create_dir_all(dir.join("projects")).unwrap();

    fs::write(dir.join("cv.docx"), minimal_docx(&["Distributed systems in Rust."])).unwrap();
    fs::write(
        dir.join("about.md"),
        "# About\n\nI build search engines. I also mentor.\n",
    )
    .unwrap();
    fs::write(dir.join("notes.txt"), "Speaker at RustConf.").unwrap();
    fs::write(
        dir.join("projects").join("list.json"),
        r#"{"projects": ["folio", "ledger"]}"#,
    )
    .unwrap();
    fs::write(dir.join("broken.docx"), b"garbage").unwrap();
    fs::write(dir.join(".hidden.md"), "secret").unwrap();
    fs::write(dir.join("image.png"), [0u8; 4]).unwrap();

    let store = DocumentStore::load(&docs_config(&dir), None).await.unwrap();

    let names: Vec<&str> = store.records().iter().map(|d| d.filename.as_str()).collect();
    assert_eq!(
        names,
        vec!["about.md", "cv.docx", "notes.txt", "projects/list.json"]
    );
    assert_eq!(store.failures().len(), 1);
    assert_eq!(store.failures()[0].filename, "broken.docx");

    let stats = store.stats();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.by_file_type.get("md"), Some(&1));
    assert_eq!(stats.by_file_type.get("json"), Some(&1));

    let hits = store.search("rust", 5);
    let hit_names: Vec<&str> = hits.iter().map(|h| h.filename.as_str()).collect();
    assert!(hit_names.contains(&"cv.docx"));
    assert!(hit_names.contains(&"notes.txt"));
}

#[tokio::test]
async fn missing_directory_is_an_empty_store() {
    let tmp = TempDir::new().unwrap();
    let store = DocumentStore::load(&docs_config(&tmp.path().join("nope")), None)
        .await
        .unwrap();
    assert!(store.is_empty());
    assert_eq!(store.stats().total, 0);
}

#[tokio::test]
async fn added_file_is_copied_and_replaces_older_version() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("docs");
    let upload = tmp.path().join("upload");
    fs::create_dir_all(&upload).unwrap();

    let mut store = DocumentStore::load(&docs_config(&dir), None).await.unwrap();

    fs::write(upload.join("cv.docx"), minimal_docx(&["Version one."])).unwrap();
    store.add_file(&upload.join("cv.docx"), None).await.unwrap();
    assert!(dir.join("cv.docx").exists());

    fs::write(upload.join("cv.docx"), minimal_docx(&["Version two."])).unwrap();
    let record = store.add_file(&upload.join("cv.docx"), None).await.unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(record.extracted_text, "Version two.");
    assert_eq!(store.get("cv.docx").unwrap().extracted_text, "Version two.");
}

#[test]
fn cli_searches_docx_documents() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("cv.docx"), minimal_docx(&["Office test phrase."])).unwrap();

    let config_path = root.join("folio.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}\"\n\n[documents]\ndir = \"{}\"\n",
            root.join("folio.sqlite").display(),
            docs.display()
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_folio"))
        .current_dir(root)
        .arg("--config")
        .arg(&config_path)
        .args(["documents", "search", "office test phrase"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("cv.docx"), "got: {}", stdout);
}
