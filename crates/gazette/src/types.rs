//! Core data types shared by every pipeline stage.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One discovered transfer endpoint for a gazette period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    /// Calendar year the period belongs to. Carried by the enclosing map key
    /// in the link index artifact, so it is never serialized per entry.
    #[serde(skip)]
    pub year: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "date", default)]
    pub publication_date: Option<String>,
    #[serde(rename = "size", default)]
    pub size_label: Option<String>,
    #[serde(rename = "ftps_url", default)]
    pub transfer_url: String,
}

impl LinkEntry {
    /// Local directory name for this period: `vol<volume>_iss<issue>`.
    pub fn period_dir_name(&self) -> String {
        let volume = non_empty_or(&self.volume, "unknown");
        let issue = non_empty_or(&self.issue, "unknown");
        format!("vol{volume}_iss{issue}")
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Year → ordered periods. Year order and entry order are preserved exactly
/// as discovered (and as read back from disk).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkIndex {
    years: Vec<(String, Vec<LinkEntry>)>,
}

impl LinkIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to its year group, creating the group on first use.
    pub fn push(&mut self, entry: LinkEntry) {
        match self.years.iter_mut().find(|(y, _)| *y == entry.year) {
            Some((_, entries)) => entries.push(entry),
            None => self.years.push((entry.year.clone(), vec![entry])),
        }
    }

    /// Insert a whole year group, replacing an existing group for that year.
    /// Every entry's `year` is set to `year`.
    pub fn insert_year(&mut self, year: impl Into<String>, mut entries: Vec<LinkEntry>) {
        let year = year.into();
        for entry in &mut entries {
            entry.year = year.clone();
        }
        match self.years.iter_mut().find(|(y, _)| *y == year) {
            Some((_, existing)) => *existing = entries,
            None => self.years.push((year, entries)),
        }
    }

    /// Entries for one year.
    pub fn get(&self, year: &str) -> Option<&[LinkEntry]> {
        self.years
            .iter()
            .find(|(y, _)| y == year)
            .map(|(_, entries)| entries.as_slice())
    }

    /// Iterate `(year, entries)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LinkEntry])> {
        self.years.iter().map(|(y, e)| (y.as_str(), e.as_slice()))
    }

    /// Year keys in insertion order.
    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.years.iter().map(|(y, _)| y.as_str())
    }

    /// Total number of periods across all years.
    pub fn period_count(&self) -> usize {
        self.years.iter().map(|(_, e)| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// The most recent year key. Numeric keys compare numerically so a
    /// three-digit year outranks a two-digit one; anything else falls back to
    /// string order.
    pub fn latest_year(&self) -> Option<&str> {
        self.years()
            .max_by(|a, b| match (a.parse::<u32>(), b.parse::<u32>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => a.cmp(b),
            })
    }
}

impl Serialize for LinkIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.years.len()))?;
        for (year, entries) in &self.years {
            map.serialize_entry(year, entries)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LinkIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = LinkIndex;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of year to link entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LinkIndex, A::Error> {
                let mut index = LinkIndex::new();
                while let Some((year, entries)) = access.next_entry::<String, Vec<LinkEntry>>()? {
                    index.insert_year(year, entries);
                }
                Ok(index)
            }
        }

        deserializer.deserialize_map(IndexVisitor)
    }
}

/// Outcome of one file transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Downloaded,
    Failed,
    /// Already present locally; nothing was transferred.
    Skipped,
}

/// File counters for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DownloadStats {
    /// Stats for a period with `total` files still to process.
    pub fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Downloaded => self.success += 1,
            FileOutcome::Failed => self.failed += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Number of files that have been classified so far.
    pub fn processed(&self) -> usize {
        self.success + self.failed + self.skipped
    }

    /// True once every listed file has been classified.
    pub fn is_complete(&self) -> bool {
        self.processed() == self.total
    }
}

/// Aggregate of many periods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_periods: usize,
    pub completed_periods: usize,
    pub total_files: usize,
    pub success_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    /// One message per period that did not complete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BatchStats {
    /// Fold a completed period into the totals.
    pub fn absorb(&mut self, period: &DownloadStats) {
        self.completed_periods += 1;
        self.total_files += period.total;
        self.success_files += period.success;
        self.failed_files += period.failed;
        self.skipped_files += period.skipped;
    }
}

/// Kind of patent a record describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatentType {
    Invention,
    Utility,
    Design,
    /// Also absorbs labels this crate does not know, such as `all`.
    #[default]
    #[serde(other)]
    Unknown,
}

impl PatentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invention => "invention",
            Self::Utility => "utility",
            Self::Design => "design",
            Self::Unknown => "unknown",
        }
    }

    /// Map a free-text kind label (localized or English) to a patent type.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.to_lowercase();
        if label.contains("發明") || lower.contains("invention") {
            Some(Self::Invention)
        } else if label.contains("新型") || lower.contains("utility") {
            Some(Self::Utility)
        } else if label.contains("設計") || lower.contains("design") {
            Some(Self::Design)
        } else {
            None
        }
    }
}

impl fmt::Display for PatentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical patent record. Missing values are empty strings, never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatentRecord {
    pub patent_number: String,
    pub application_number: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub description: String,
    #[serde(deserialize_with = "string_or_seq")]
    pub claims: Vec<String>,
    pub inventor: String,
    pub applicant: String,
    pub application_date: String,
    pub publication_date: String,
    pub ipc_classification: String,
    pub patent_type: PatentType,
    #[serde(alias = "url")]
    pub source_uri: String,
}

impl PatentRecord {
    /// True when no field carries any content.
    pub fn is_blank(&self) -> bool {
        self.patent_number.is_empty()
            && self.application_number.is_empty()
            && self.title.is_empty()
            && self.abstract_text.is_empty()
            && self.description.is_empty()
            && self.claims.is_empty()
            && self.inventor.is_empty()
            && self.applicant.is_empty()
    }
}

/// Older artifacts stored claims as one newline-joined string.
fn string_or_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Claims {
        One(String),
        Many(Vec<String>),
        Missing(()),
    }

    Ok(match Claims::deserialize(deserializer)? {
        Claims::One(s) if s.is_empty() => Vec::new(),
        Claims::One(s) => vec![s],
        Claims::Many(v) => v,
        Claims::Missing(()) => Vec::new(),
    })
}

/// Provenance attached to every chunk. Bibliographic fields are only present
/// for chunks derived from patent records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patent_number: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    pub section: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc_classification: Option<String>,
}

/// One retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Errors that can occur in the gazette library.
#[derive(thiserror::Error, Debug)]
pub enum GazetteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error in {path}: {message}")]
    Xml { path: String, message: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenience result type.
pub type GazetteResult<T> = Result<T, GazetteError>;
