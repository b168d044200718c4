//! JSON artifact layout and readers/writers for links, records and chunks.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::types::{Chunk, GazetteError, GazetteResult, LinkIndex, PatentRecord};

const LINKS_SUFFIX: &str = "_links.json";
const DOCS_SUFFIX: &str = "_docs.json";
const CHUNKS_SUFFIX: &str = "_chunks.json";

/// Where each artifact of a category lives.
///
/// Link indexes and canonical records go to the raw directory, chunk sets to
/// the processed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(raw_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn links_path(&self, category: &str) -> PathBuf {
        self.raw_dir.join(format!("{category}{LINKS_SUFFIX}"))
    }

    pub fn docs_path(&self, category: &str) -> PathBuf {
        self.raw_dir.join(format!("{category}{DOCS_SUFFIX}"))
    }

    pub fn chunks_path(&self, category: &str) -> PathBuf {
        self.processed_dir.join(format!("{category}{CHUNKS_SUFFIX}"))
    }

    /// Directory downloads for a category are placed under.
    pub fn download_dir(&self, category: &str) -> PathBuf {
        self.raw_dir.join(format!("{category}_downloads"))
    }

    pub fn save_links(&self, category: &str, index: &LinkIndex) -> GazetteResult<PathBuf> {
        let path = self.links_path(category);
        write_json(&path, index)?;
        info!("saved {} periods to {}", index.period_count(), path.display());
        Ok(path)
    }

    pub fn load_links(&self, category: &str) -> GazetteResult<LinkIndex> {
        read_json(&self.links_path(category))
    }

    pub fn save_records(&self, category: &str, records: &[PatentRecord]) -> GazetteResult<PathBuf> {
        let path = self.docs_path(category);
        write_json(&path, records)?;
        info!("saved {} records to {}", records.len(), path.display());
        Ok(path)
    }

    /// Raw documents of a category, untyped so older shapes survive loading.
    /// A missing file yields an empty list.
    pub fn load_documents(&self, category: &str) -> GazetteResult<Vec<Value>> {
        let path = self.docs_path(category);
        if !path.exists() {
            warn!("input file not found: {}", path.display());
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    pub fn save_chunks(&self, category: &str, chunks: &[Chunk]) -> GazetteResult<PathBuf> {
        let path = self.chunks_path(category);
        write_json(&path, chunks)?;
        info!("saved {} chunks to {}", chunks.len(), path.display());
        Ok(path)
    }

    pub fn load_chunks(&self, category: &str) -> GazetteResult<Vec<Chunk>> {
        read_json(&self.chunks_path(category))
    }

    /// Categories that have a records artifact in the raw directory.
    pub fn document_categories(&self) -> GazetteResult<Vec<String>> {
        discover_categories(&self.raw_dir, DOCS_SUFFIX)
    }

    /// Categories that have a chunk artifact in the processed directory.
    pub fn chunk_categories(&self) -> GazetteResult<Vec<String>> {
        discover_categories(&self.processed_dir, CHUNKS_SUFFIX)
    }
}

/// Write `value` as pretty-printed UTF-8 JSON, creating parent directories.
/// Non-ASCII text is written as-is.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> GazetteResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> GazetteResult<T> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Sorted category names taken from files in `dir` named `<category><suffix>`.
pub fn discover_categories(dir: &Path, suffix: &str) -> GazetteResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        return Err(GazetteError::InvalidPath(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut categories = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(category) = name.strip_suffix(suffix).filter(|c| !c.is_empty()) {
            categories.push(category.to_string());
        }
    }
    categories.sort();
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkEntry;

    #[test]
    fn test_artifact_paths() {
        let store = ArtifactStore::new("/data/raw", "/data/processed");
        assert_eq!(store.links_path("invention"), PathBuf::from("/data/raw/invention_links.json"));
        assert_eq!(store.docs_path("design"), PathBuf::from("/data/raw/design_docs.json"));
        assert_eq!(
            store.chunks_path("utility"),
            PathBuf::from("/data/processed/utility_chunks.json")
        );
    }

    #[test]
    fn test_links_roundtrip_keeps_order_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("raw"), dir.path().join("processed"));

        let mut index = LinkIndex::new();
        index.insert_year(
            "114",
            vec![LinkEntry {
                volume: "52".into(),
                issue: "29".into(),
                title: "第 52 卷 29 期".into(),
                transfer_url: "ftps://host/A/114/B".into(),
                ..LinkEntry::default()
            }],
        );
        index.insert_year("113", vec![]);

        let path = store.save_links("invention", &index).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("第 52 卷 29 期"));

        let loaded = store.load_links("invention").unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_discover_categories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["utility_docs.json", "invention_docs.json", "_docs.json", "notes.txt"] {
            std::fs::write(dir.path().join(name), "[]").unwrap();
        }
        let store = ArtifactStore::new(dir.path(), dir.path());
        assert_eq!(store.document_categories().unwrap(), vec!["invention", "utility"]);
        assert!(store.chunk_categories().unwrap().is_empty());
    }

    #[test]
    fn test_missing_documents_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), dir.path());
        assert!(store.load_documents("design").unwrap().is_empty());
    }
}
