//! Split canonical records (and older generic documents) into
//! retrieval-sized chunks with provenance metadata.

use std::collections::{BTreeSet, VecDeque};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::{Chunk, ChunkMetadata, GazetteError, GazetteResult, PatentRecord};

/// Split points tried in order. The empty separator splits into characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Section label used for patent-shaped documents that carry no type.
const DEFAULT_SECTION: &str = "all";

/// Chunk sizing, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> GazetteResult<()> {
        if self.chunk_size == 0 {
            return Err(GazetteError::InvalidConfig(
                "chunk_size must be positive".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(GazetteError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// One `{url, heading, content}` entry of a sectioned document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSection {
    pub url: String,
    pub heading: String,
    pub content: String,
}

/// Older generic document split into headed sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionedDocument {
    pub title: String,
    pub section: String,
    pub sections: Vec<DocumentSection>,
}

/// Older generic document with one content body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BareDocument {
    pub url: String,
    pub title: String,
    pub section: String,
    pub content: String,
}

/// Every input shape the normalizer accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDocument {
    /// A canonical record plus the section label it is filed under.
    Patent { record: PatentRecord, section: String },
    Sectioned(SectionedDocument),
    Bare(BareDocument),
}

impl SourceDocument {
    /// Classify a raw JSON object. Anything carrying `patent_number` is a
    /// canonical record, a non-empty `sections` array marks the sectioned
    /// shape, and everything else is treated as a bare document.
    pub fn from_value(value: Value) -> GazetteResult<Self> {
        if value.get("patent_number").is_some() {
            let section = value
                .get("patent_type")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SECTION)
                .to_string();
            let record: PatentRecord = serde_json::from_value(value)?;
            return Ok(Self::Patent { record, section });
        }

        let sectioned = value
            .get("sections")
            .and_then(Value::as_array)
            .is_some_and(|s| !s.is_empty());
        if sectioned {
            Ok(Self::Sectioned(serde_json::from_value(value)?))
        } else {
            Ok(Self::Bare(serde_json::from_value(value)?))
        }
    }
}

impl From<PatentRecord> for SourceDocument {
    fn from(record: PatentRecord) -> Self {
        let section = record.patent_type.as_str().to_string();
        Self::Patent { record, section }
    }
}

/// Summary of a chunk set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStatistics {
    pub total_chunks: usize,
    pub avg_chunk_length: f64,
    pub min_chunk_length: usize,
    pub max_chunk_length: usize,
    pub sections: Vec<String>,
}

/// Statistics over `chunks`, or `None` for an empty set. Lengths are in
/// characters and `sections` is sorted.
pub fn chunk_statistics(chunks: &[Chunk]) -> Option<ChunkStatistics> {
    if chunks.is_empty() {
        return None;
    }
    let lengths: Vec<usize> = chunks.iter().map(|c| char_len(&c.text)).collect();
    let sections: BTreeSet<&str> = chunks.iter().map(|c| c.metadata.section.as_str()).collect();

    Some(ChunkStatistics {
        total_chunks: chunks.len(),
        avg_chunk_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        min_chunk_length: lengths.iter().copied().min().unwrap_or_default(),
        max_chunk_length: lengths.iter().copied().max().unwrap_or_default(),
        sections: sections.into_iter().map(str::to_string).collect(),
    })
}

/// Collapse runs of 3+ newlines to two and runs of spaces to one, then trim.
pub fn clean_text(text: &str) -> String {
    static NEWLINES: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let newlines = NEWLINES.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r" {2,}").expect("valid regex"));

    let text = newlines.replace_all(text, "\n\n");
    let text = spaces.replace_all(&text, " ");
    text.trim().to_string()
}

/// Chunking front end.
#[derive(Debug, Clone, Default)]
pub struct DocumentNormalizer {
    config: ChunkerConfig,
}

impl DocumentNormalizer {
    pub fn new(config: ChunkerConfig) -> GazetteResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Chunk one document of any accepted shape.
    pub fn normalize(&self, document: &SourceDocument) -> Vec<Chunk> {
        match document {
            SourceDocument::Patent { record, section } => self.normalize_patent(record, section),
            SourceDocument::Sectioned(doc) => self.normalize_sectioned(doc),
            SourceDocument::Bare(doc) => self.normalize_bare(doc),
        }
    }

    /// Chunk a list of raw JSON documents. Entries that match no accepted
    /// shape are logged and skipped.
    pub fn normalize_values(&self, documents: Vec<Value>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (i, value) in documents.into_iter().enumerate() {
            match SourceDocument::from_value(value) {
                Ok(doc) => chunks.extend(self.normalize(&doc)),
                Err(e) => warn!("skipping document {i}: {e}"),
            }
        }
        chunks
    }

    /// Split cleaned text into chunks of at most `chunk_size` characters
    /// where a separator allows it.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn normalize_patent(&self, record: &PatentRecord, section: &str) -> Vec<Chunk> {
        let claims = record.claims.join("\n");
        let parts = [
            ("abstract", "摘要", record.abstract_text.as_str()),
            ("description", "說明書", record.description.as_str()),
            ("claims", "申請專利範圍", claims.as_str()),
        ];

        let mut chunks = Vec::new();
        for (part, heading, content) in parts {
            if content.is_empty() {
                continue;
            }
            let pieces = self.split_text(&clean_text(content));
            let total = pieces.len();
            chunks.extend(pieces.into_iter().enumerate().map(|(i, text)| Chunk {
                text,
                metadata: ChunkMetadata {
                    patent_number: Some(record.patent_number.clone()),
                    title: record.title.clone(),
                    heading: Some(heading.to_string()),
                    part: Some(part.to_string()),
                    section: section.to_string(),
                    chunk_index: i,
                    total_chunks: total,
                    source_url: record.source_uri.clone(),
                    inventor: Some(record.inventor.clone()),
                    applicant: Some(record.applicant.clone()),
                    application_date: Some(record.application_date.clone()),
                    ipc_classification: Some(record.ipc_classification.clone()),
                },
            }));
        }
        chunks
    }

    fn normalize_sectioned(&self, doc: &SectionedDocument) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for entry in &doc.sections {
            let pieces = self.split_text(&clean_text(&entry.content));
            let total = pieces.len();
            chunks.extend(pieces.into_iter().enumerate().map(|(i, text)| Chunk {
                text,
                metadata: ChunkMetadata {
                    title: doc.title.clone(),
                    heading: Some(entry.heading.clone()),
                    section: doc.section.clone(),
                    chunk_index: i,
                    total_chunks: total,
                    source_url: entry.url.clone(),
                    ..ChunkMetadata::default()
                },
            }));
        }
        chunks
    }

    fn normalize_bare(&self, doc: &BareDocument) -> Vec<Chunk> {
        let pieces = self.split_text(&clean_text(&doc.content));
        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text,
                metadata: ChunkMetadata {
                    title: doc.title.clone(),
                    section: doc.section.clone(),
                    chunk_index: i,
                    total_chunks: total,
                    source_url: doc.url.clone(),
                    ..ChunkMetadata::default()
                },
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let splits = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) < self.config.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next chunk.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let ChunkerConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        let mut docs = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if total + len > chunk_size && !current.is_empty() {
                push_joined(&current, &mut docs);
                while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, front)) => total -= front,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }
        push_joined(&current, &mut docs);
        docs
    }
}

fn push_joined(current: &VecDeque<(&str, usize)>, docs: &mut Vec<String>) {
    let joined: String = current.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// First separator present in `text`, and the finer separators after it.
/// The empty separator always matches and has nothing finer.
fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep) {
            return (*sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split so every piece after the first starts with `separator`. An empty
/// separator yields single characters. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(size: usize, overlap: usize) -> DocumentNormalizer {
        DocumentNormalizer::new(ChunkerConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a\n\n\n\nb   c  "), "a\n\nb c");
        assert_eq!(clean_text("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(split_keeping_separator("a b c", " "), vec!["a", " b", " c"]);
        assert_eq!(split_keeping_separator(" a", " "), vec![" a"]);
        assert_eq!(split_keeping_separator("你好", ""), vec!["你", "好"]);
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let n = normalizer(1000, 100);
        assert_eq!(n.split_text("short text"), vec!["short text".to_string()]);
        assert!(n.split_text("").is_empty());
    }

    #[test]
    fn test_paragraphs_pack_with_overlap() {
        let n = normalizer(10, 5);
        let chunks = n.split_text("aaaa bbbb cccc dddd");
        assert_eq!(chunks, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
    }

    #[test]
    fn test_overlong_word_is_split_by_characters() {
        let n = normalizer(5, 0);
        let chunks = n.split_text("abcdefghijkl");
        assert_eq!(chunks, vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = ChunkerConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        };
        assert!(DocumentNormalizer::new(bad).is_err());
        let zero = ChunkerConfig {
            chunk_size: 0,
            chunk_overlap: 0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_classify_shapes() {
        let patent = SourceDocument::from_value(serde_json::json!({
            "patent_number": "I1", "patent_type": "all", "abstract": "x"
        }))
        .unwrap();
        assert!(matches!(patent, SourceDocument::Patent { ref section, .. } if section == "all"));

        let sectioned = SourceDocument::from_value(serde_json::json!({
            "title": "t", "section": "faq",
            "sections": [{"url": "u#a", "heading": "h", "content": "c"}]
        }))
        .unwrap();
        assert!(matches!(sectioned, SourceDocument::Sectioned(_)));

        let bare = SourceDocument::from_value(serde_json::json!({
            "title": "t", "sections": [], "content": "c"
        }))
        .unwrap();
        assert!(matches!(bare, SourceDocument::Bare(_)));
    }

    #[test]
    fn test_patent_parts_and_metadata() {
        let record = PatentRecord {
            patent_number: "I123456".into(),
            title: "散熱裝置".into(),
            abstract_text: "摘要內容".into(),
            claims: vec!["請求項1: 一".into(), "請求項2: 二".into()],
            patent_type: crate::types::PatentType::Invention,
            source_uri: "file:///a.xml".into(),
            ..PatentRecord::default()
        };
        let chunks = normalizer(1000, 100).normalize(&record.into());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.part.as_deref(), Some("abstract"));
        assert_eq!(chunks[0].metadata.heading.as_deref(), Some("摘要"));
        assert_eq!(chunks[1].text, "請求項1: 一\n請求項2: 二");
        assert_eq!(chunks[1].metadata.heading.as_deref(), Some("申請專利範圍"));
        assert_eq!(chunks[1].metadata.section, "invention");
        assert_eq!(chunks[1].metadata.source_url, "file:///a.xml");
        assert_eq!(chunks[1].metadata.inventor.as_deref(), Some(""));
    }

    #[test]
    fn test_bare_document_has_no_heading() {
        let chunks = normalizer(1000, 100).normalize_values(vec![serde_json::json!({
            "url": "https://x", "title": "t", "section": "s", "content": "body"
        })]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.heading, None);
        assert_eq!(chunks[0].metadata.patent_number, None);
    }

    #[test]
    fn test_statistics() {
        assert!(chunk_statistics(&[]).is_none());
        let chunks = normalizer(1000, 100).normalize_values(vec![
            serde_json::json!({"section": "b", "content": "abcd"}),
            serde_json::json!({"section": "a", "content": "ab"}),
        ]);
        let stats = chunk_statistics(&chunks).unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.min_chunk_length, 2);
        assert_eq!(stats.max_chunk_length, 4);
        assert!((stats.avg_chunk_length - 3.0).abs() < f64::EPSILON);
        assert_eq!(stats.sections, vec!["a".to_string(), "b".to_string()]);
    }
}
