//! Keyword search over the loaded profile documents.
//!
//! Scoring is deliberately simple and deterministic:
//!
//! - whole-query phrase found in content: +3, in summary: +2, in any
//!   keyword: +1, in filename: +1
//! - each distinct query term found in content: +1, in keywords: +0.5
//!
//! Only documents with a positive score are returned, sorted by score
//! (desc) then filename (asc) and truncated to the requested limit.

use serde::Serialize;
use std::collections::HashSet;

use crate::models::DocumentRecord;

/// Terms too common to carry meaning for matching or keyword extraction.
pub(crate) const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "more", "my", "no",
    "not", "of", "on", "or", "our", "out", "she", "so", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "to", "up", "us", "was", "we", "were",
    "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub filename: String,
    pub score: f64,
    /// Which fields matched: `content`, `summary`, `keywords`, `filename`.
    pub matched_in: Vec<String>,
    pub summary: String,
    pub keywords: Vec<String>,
    pub snippet: String,
}

/// Lowercased alphanumeric terms of `text`, stopwords and 1-char tokens removed.
pub(crate) fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|t| t.chars().count() > 1 && t.chars().any(char::is_alphanumeric))
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Char-for-char lowercase so char offsets line up with the input.
fn fold_case(text: &str) -> String {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

pub fn search_documents(
    docs: &[DocumentRecord],
    query: &str,
    limit: usize,
    snippet_chars: usize,
) -> Vec<SearchHit> {
    let phrase = fold_case(query.trim());
    if phrase.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let query_terms: Vec<String> = terms(&phrase)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();

    let mut hits: Vec<SearchHit> = docs
        .iter()
        .filter_map(|doc| score_document(doc, &phrase, &query_terms, snippet_chars))
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    hits.truncate(limit);
    hits
}

fn score_document(
    doc: &DocumentRecord,
    phrase: &str,
    query_terms: &[String],
    snippet_chars: usize,
) -> Option<SearchHit> {
    let content = fold_case(&doc.extracted_text);
    let summary = doc.summary.to_lowercase();
    let keywords: Vec<String> = doc.keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut score = 0.0;
    let mut matched_in: Vec<String> = Vec::new();
    fn mark(field: &str, matched: &mut Vec<String>) {
        if !matched.iter().any(|m| m == field) {
            matched.push(field.to_string());
        }
    }

    if content.contains(phrase) {
        score += 3.0;
        mark("content", &mut matched_in);
    }
    if summary.contains(phrase) {
        score += 2.0;
        mark("summary", &mut matched_in);
    }
    if keywords.iter().any(|k| k.contains(phrase)) {
        score += 1.0;
        mark("keywords", &mut matched_in);
    }
    if doc.filename.to_lowercase().contains(phrase) {
        score += 1.0;
        mark("filename", &mut matched_in);
    }

    for term in query_terms {
        if content.contains(term.as_str()) {
            score += 1.0;
            mark("content", &mut matched_in);
        }
        if keywords.iter().any(|k| k.contains(term.as_str())) {
            score += 0.5;
            mark("keywords", &mut matched_in);
        }
    }

    if score <= 0.0 {
        return None;
    }

    let anchor = content
        .find(phrase)
        .or_else(|| query_terms.iter().find_map(|t| content.find(t.as_str())))
        .map(|byte| content[..byte].chars().count())
        .unwrap_or(0);

    Some(SearchHit {
        filename: doc.filename.clone(),
        score,
        matched_in,
        summary: doc.summary.clone(),
        keywords: doc.keywords.clone(),
        snippet: snippet(&doc.extracted_text, anchor, snippet_chars),
    })
}

/// Up to `max_chars` chars of `text` around char offset `anchor`,
/// whitespace collapsed, with ellipses where the text was cut.
pub(crate) fn snippet(text: &str, anchor: usize, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || max_chars == 0 {
        return String::new();
    }
    let start = anchor.saturating_sub(max_chars / 3).min(chars.len());
    let end = (start + max_chars).min(chars.len());

    let body: String = chars[start..end].iter().collect();
    let body = body.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&body);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}
