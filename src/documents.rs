//! In-memory store of the profile documents the assistant answers from.
//!
//! [`DocumentStore::load`] walks the configured directory (include and
//! exclude globs as in the filesystem scanners), extracts every supported
//! file, and derives a summary plus keywords for each. A file that fails to
//! extract is logged, skipped, and counted in [`DocumentStats::failed`].
//!
//! Summaries and keywords come from a cheap heuristic unless
//! `documents.ai_insights` is set and a model is supplied, in which case
//! the model is asked for them and the heuristic is the fallback.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::{Error, Result};
use crate::extract;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ModelReply};
use crate::models::{now_ts, DocumentRecord};
use crate::search::{self, SearchHit};
use crate::store::Store;

const SUMMARY_MAX_CHARS: usize = 300;
const KEYWORD_COUNT: usize = 8;
const INSIGHTS_PREVIEW_CHARS: usize = 3000;
const INSIGHTS_TEMPERATURE: f32 = 0.3;

/// A file that was found but could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDocument {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStats {
    /// Files found, processed or not.
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub by_file_type: BTreeMap<String, usize>,
    pub total_chars: usize,
    pub average_chars: f64,
}

pub struct DocumentStore {
    config: DocumentsConfig,
    docs: Vec<DocumentRecord>,
    failures: Vec<FailedDocument>,
}

impl DocumentStore {
    /// A store with no documents (used when the directory is absent).
    pub fn empty(config: &DocumentsConfig) -> Self {
        Self {
            config: config.clone(),
            docs: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Build a store directly from records, bypassing the filesystem.
    pub fn from_records(config: &DocumentsConfig, mut docs: Vec<DocumentRecord>) -> Self {
        docs.sort_by(|a, b| a.filename.cmp(&b.filename));
        Self {
            config: config.clone(),
            docs,
            failures: Vec::new(),
        }
    }

    pub async fn load(config: &DocumentsConfig, insights: Option<&dyn ChatModel>) -> Result<Self> {
        let mut store = Self::empty(config);
        let root = &config.dir;
        if !root.is_dir() {
            tracing::info!(dir = %root.display(), "documents directory not found; starting empty");
            return Ok(store);
        }

        let insights = insights.filter(|_| config.ai_insights);
        for (path, filename) in scan_directory(config)? {
            match process_file(&path, &filename, insights).await {
                Ok(record) => store.docs.push(record),
                Err(e) => {
                    tracing::warn!(file = %filename, error = %e, "skipping document");
                    store.failures.push(FailedDocument {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            loaded = store.docs.len(),
            failed = store.failures.len(),
            dir = %root.display(),
            "documents loaded"
        );
        Ok(store)
    }

    /// Copy `path` into the documents directory and (re)process it. A
    /// record with the same filename is replaced.
    pub async fn add_file(
        &mut self,
        path: &Path,
        insights: Option<&dyn ChatModel>,
    ) -> Result<DocumentRecord> {
        if !extract::is_supported(path) {
            return Err(Error::Document(format!(
                "unsupported file type: {}",
                path.display()
            )));
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Document(format!("not a file: {}", path.display())))?;

        std::fs::create_dir_all(&self.config.dir).map_err(|e| {
            Error::Document(format!("cannot create {}: {}", self.config.dir.display(), e))
        })?;
        let target = self.config.dir.join(&filename);
        if !same_file(path, &target) {
            std::fs::copy(path, &target).map_err(|e| {
                Error::Document(format!("cannot copy {}: {}", path.display(), e))
            })?;
        }

        let insights = insights.filter(|_| self.config.ai_insights);
        let record = process_file(&target, &filename, insights).await?;

        self.docs.retain(|d| d.filename != filename);
        self.failures.retain(|f| f.filename != filename);
        self.docs.push(record.clone());
        self.docs.sort_by(|a, b| a.filename.cmp(&b.filename));

        tracing::info!(file = %filename, chars = record.content_length(), "document added");
        Ok(record)
    }

    /// Persist the metadata of every loaded document.
    pub async fn sync_metadata(&self, store: &Store) -> Result<()> {
        for doc in &self.docs {
            store.upsert_document(doc).await?;
        }
        Ok(())
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.docs
    }

    pub fn get(&self, filename: &str) -> Option<&DocumentRecord> {
        self.docs.iter().find(|d| d.filename == filename)
    }

    pub fn failures(&self) -> &[FailedDocument] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        search::search_documents(&self.docs, query, limit, self.config.snippet_chars)
    }

    pub fn stats(&self) -> DocumentStats {
        let mut by_file_type = BTreeMap::new();
        let mut total_chars = 0;
        for doc in &self.docs {
            *by_file_type.entry(doc.file_type.clone()).or_insert(0) += 1;
            total_chars += doc.content_length();
        }
        let processed = self.docs.len();
        DocumentStats {
            total: processed + self.failures.len(),
            processed,
            failed: self.failures.len(),
            by_file_type,
            total_chars,
            average_chars: if processed > 0 {
                total_chars as f64 / processed as f64
            } else {
                0.0
            },
        }
    }

    /// Document context for the system prompt.
    ///
    /// The best `max_docs` matches for `query` (summary + excerpt), or, when
    /// nothing matches, the summary of every document. Capped at `max_chars`.
    pub fn context_excerpt(&self, query: &str, max_docs: usize, max_chars: usize) -> String {
        if self.docs.is_empty() || max_docs == 0 {
            return String::new();
        }

        let hits = self.search(query, max_docs);
        let mut out = String::new();
        if hits.is_empty() {
            out.push_str("Available documents:\n");
            for doc in &self.docs {
                out.push_str(&format!("- {}: {}\n", doc.filename, doc.summary));
            }
        } else {
            out.push_str("Relevant documents:\n");
            for hit in &hits {
                out.push_str(&format!(
                    "\n### {}\nSummary: {}\nExcerpt: {}\n",
                    hit.filename, hit.summary, hit.snippet
                ));
            }
        }

        truncate_chars(&out, max_chars)
    }
}

/// Supported files under `config.dir`, as (path, relative filename), sorted.
fn scan_directory(config: &DocumentsConfig) -> Result<Vec<(PathBuf, String)>> {
    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/.*".to_string(), "**/.*/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&config.dir) {
        let entry = entry.map_err(|e| Error::Document(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&config.dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Configuration(format!("invalid glob {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Configuration(e.to_string()))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn process_file(
    path: &Path,
    filename: &str,
    insights: Option<&dyn ChatModel>,
) -> Result<DocumentRecord> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Document(format!("cannot read {}: {}", path.display(), e)))?;
    let file_type = extract::file_type(path).unwrap_or_default();
    let extracted = extract::extract_bytes(&bytes, &file_type)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let (summary, keywords) = match insights {
        Some(model) => match ai_insights(model, filename, &extracted.text).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(file = %filename, error = %e, "AI insights failed; using heuristic");
                heuristic_insights(filename, &extracted.text)
            }
        },
        None => heuristic_insights(filename, &extracted.text),
    };

    tracing::debug!(file = %filename, file_type = %file_type, metadata = %extracted.metadata, "document processed");

    Ok(DocumentRecord {
        filename: filename.to_string(),
        file_type,
        extracted_text: extracted.text,
        summary,
        keywords,
        content_hash,
        size_bytes: bytes.len() as u64,
        processed_at: now_ts(),
    })
}

fn heuristic_insights(filename: &str, text: &str) -> (String, Vec<String>) {
    (heuristic_summary(filename, text), heuristic_keywords(text))
}

/// First two sentences of the text, at most 300 chars.
pub(crate) fn heuristic_summary(filename: &str, text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return format!("Document: {}", filename);
    }

    let mut sentences = 0;
    let mut end = flat.len();
    let mut chars = flat.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at_boundary = matches!(chars.peek(), None | Some((_, ' ')));
        if matches!(c, '.' | '!' | '?') && at_boundary {
            sentences += 1;
            if sentences == 2 {
                end = i + c.len_utf8();
                break;
            }
        }
    }

    let summary = &flat[..end];
    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = summary.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    } else {
        summary.to_string()
    }
}

/// Most frequent non-stopword terms (ties broken alphabetically).
pub(crate) fn heuristic_keywords(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for term in search::terms(text) {
        if term.chars().count() < 3 || term.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        *counts.entry(term).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(KEYWORD_COUNT)
        .map(|(term, _)| term)
        .collect()
}

#[derive(serde::Deserialize)]
struct Insights {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    keywords: Vec<String>,
}

async fn ai_insights(
    model: &dyn ChatModel,
    filename: &str,
    text: &str,
) -> Result<(String, Vec<String>)> {
    let preview: String = text.chars().take(INSIGHTS_PREVIEW_CHARS).collect();
    let prompt = format!(
        "Analyze the following document content from file \"{filename}\":\n\n\
         {preview}\n\n\
         Provide a concise 2-3 sentence summary and 5-8 relevant keywords.\n\
         Respond with JSON only: {{\"summary\": \"...\", \"keywords\": [\"...\"]}}"
    );

    let request = ChatRequest {
        model: model.model_name().to_string(),
        messages: vec![ChatMessage::user(prompt)],
        tools: Vec::new(),
        temperature: INSIGHTS_TEMPERATURE,
    };

    let raw = match model.complete(&request).await? {
        ModelReply::Text(text) => text,
        ModelReply::ToolCall(_) => {
            return Err(Error::ExternalService(
                "unexpected tool call in insights reply".to_string(),
            ))
        }
    };

    let json = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let insights: Insights = serde_json::from_str(json)?;
    if insights.summary.trim().is_empty() {
        return Err(Error::ExternalService("insights reply had no summary".to_string()));
    }
    Ok((insights.summary, insights.keywords))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path) -> DocumentsConfig {
        DocumentsConfig {
            dir: dir.to_path_buf(),
            ..DocumentsConfig::default()
        }
    }

    #[test]
    fn summary_takes_two_sentences() {
        let s = heuristic_summary(
            "cv.md",
            "I build things. Mostly in Rust!  Also some   Go. And SQL.",
        );
        assert_eq!(s, "I build things. Mostly in Rust!");
    }

    #[test]
    fn summary_is_capped() {
        let long = "word ".repeat(200);
        let s = heuristic_summary("cv.md", &long);
        assert!(s.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(s.ends_with("..."));
        assert_eq!(heuristic_summary("empty.txt", "  "), "Document: empty.txt");
    }

    #[test]
    fn keywords_rank_by_frequency() {
        let kw = heuristic_keywords("Rust rust RUST postgres postgres kafka the the the 2024");
        assert_eq!(kw[..3], ["rust", "postgres", "kafka"]);
        assert!(!kw.contains(&"2024".to_string()));
    }

    #[tokio::test]
    async fn load_skips_unreadable_and_unsupported_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("about.md"), "# Jane\nRust engineer. Likes SQL.").unwrap();
        std::fs::write(tmp.path().join("data.json"), "{not json").unwrap();
        std::fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let store = DocumentStore::load(&config(tmp.path()), None).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].filename, "about.md");
        assert_eq!(store.failures().len(), 1);

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_file_type.get("md"), Some(&1));
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::load(&config(&tmp.path().join("nope")), None)
            .await
            .unwrap();
        assert!(store.is_empty());
        assert_eq!(store.context_excerpt("anything", 3, 1000), "");
    }

    #[tokio::test]
    async fn add_file_replaces_same_name() {
        let docs_dir = TempDir::new().unwrap();
        let upload = TempDir::new().unwrap();
        let source = upload.path().join("notes.txt");

        let mut store = DocumentStore::empty(&config(docs_dir.path()));
        std::fs::write(&source, "First version.").unwrap();
        store.add_file(&source, None).await.unwrap();
        std::fs::write(&source, "Second version.").unwrap();
        let record = store.add_file(&source, None).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(record.extracted_text, "Second version.");
        assert!(docs_dir.path().join("notes.txt").exists());
        assert!(store.add_file(&upload.path().join("x.exe"), None).await.is_err());
    }

    #[test]
    fn context_excerpt_prefers_matches() {
        let cfg = DocumentsConfig::default();
        let doc = |name: &str, text: &str| DocumentRecord {
            filename: name.to_string(),
            file_type: "md".to_string(),
            extracted_text: text.to_string(),
            summary: format!("About {}", name),
            keywords: Vec::new(),
            content_hash: String::new(),
            size_bytes: 0,
            processed_at: 0,
        };
        let store = DocumentStore::from_records(
            &cfg,
            vec![doc("a.md", "Kubernetes operator work."), doc("b.md", "Watercolour painting.")],
        );

        let matched = store.context_excerpt("kubernetes", 3, 4000);
        assert!(matched.contains("### a.md"));
        assert!(!matched.contains("b.md"));

        let fallback = store.context_excerpt("astronomy", 3, 4000);
        assert!(fallback.contains("- a.md: About a.md"));
        assert!(fallback.contains("- b.md: About b.md"));

        assert_eq!(store.context_excerpt("astronomy", 3, 10).chars().count(), 10);
    }
}
