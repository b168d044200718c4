//! Convert gazette XML documents into canonical [`PatentRecord`]s.
//!
//! Each field is resolved by an ordered chain of extractors; the first one
//! returning non-empty text wins. Source documents vary between issues, so a
//! missing path is never an error, only an empty field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::types::{GazetteError, GazetteResult, PatentRecord, PatentType};
use crate::xml::Element;

/// Auxiliary files shipped alongside patent documents in every period.
const EXCLUDED_FILES: &[&str] = &["index.xml", "patent.dtd"];

/// Progress is logged once every this many files.
const PROGRESS_INTERVAL: usize = 100;

type Extractor = fn(&Element) -> String;

const PATENT_NUMBER: &[Extractor] = &[certificate_number, publication_number];
const TITLE: &[Extractor] = &[chinese_title, english_title];
const PERSON_NAME: &[Extractor] = &[chinese_name, english_name];
const KIND_LABEL: &[Extractor] = &[patent_type_label, kind_label];

fn certificate_number(root: &Element) -> String {
    root.path_text(&["certificate-number", "document-id", "doc-number"])
}

fn publication_number(root: &Element) -> String {
    root.path_text(&["publication-reference", "document-id", "doc-number"])
}

fn chinese_title(root: &Element) -> String {
    root.path_text(&["invention-title", "chinese-title"])
}

fn english_title(root: &Element) -> String {
    root.path_text(&["invention-title", "english-title"])
}

fn chinese_name(person: &Element) -> String {
    person.path_text(&["chinese-name", "last-name"])
}

fn english_name(person: &Element) -> String {
    person.path_text(&["english-name", "last-name"])
}

fn patent_type_label(root: &Element) -> String {
    root.path_text(&["patent-type"])
}

fn kind_label(root: &Element) -> String {
    root.path_text(&["kind"])
}

fn first_non_empty(element: &Element, chain: &[Extractor]) -> String {
    chain
        .iter()
        .map(|extract| extract(element))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Trimmed text of every descendant under the first element named `name`.
fn block_text(root: &Element, name: &str) -> String {
    root.find(&[name])
        .map(|e| e.all_text().trim().to_string())
        .unwrap_or_default()
}

fn claims(root: &Element) -> Vec<String> {
    root.find_all(&["claims", "claim"])
        .into_iter()
        .filter_map(|claim| {
            let text = claim.all_text().trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(match claim.attr("num").filter(|n| !n.is_empty()) {
                Some(num) => format!("請求項{num}: {text}"),
                None => text,
            })
        })
        .collect()
}

fn persons(root: &Element, list: &str, person: &str) -> String {
    root.find_all(&[list, person])
        .into_iter()
        .map(|p| first_non_empty(p, PERSON_NAME))
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Successfully parsed records plus the number of files attempted.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub records: Vec<PatentRecord>,
    pub attempted: usize,
}

impl ParseOutcome {
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.records.len()
    }

    /// Fraction of attempted files that produced a record (1.0 when nothing
    /// was attempted).
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            1.0
        } else {
            self.records.len() as f64 / self.attempted as f64
        }
    }
}

/// One row of a period's `index.xml` manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub application_number: String,
    pub patent_number: String,
    pub title: String,
    pub xml_filename: String,
}

/// Parser for gazette patent documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatentXmlParser {
    default_type: PatentType,
}

impl PatentXmlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patent type assigned when a document carries no recognizable kind label.
    pub fn with_default_type(default_type: PatentType) -> Self {
        Self { default_type }
    }

    /// Parse one file into a record.
    pub fn parse_file(&self, path: &Path) -> GazetteResult<PatentRecord> {
        let bytes = std::fs::read(path)?;
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let source_uri = format!("file://{}", absolute.display());
        self.parse_bytes(&bytes, &source_uri)
    }

    /// Parse an in-memory document. `source_uri` is recorded verbatim.
    pub fn parse_bytes(&self, bytes: &[u8], source_uri: &str) -> GazetteResult<PatentRecord> {
        let root = Element::parse(bytes).map_err(|message| GazetteError::Xml {
            path: source_uri.to_string(),
            message,
        })?;

        let patent_number = first_non_empty(&root, PATENT_NUMBER);
        if patent_number.is_empty() {
            warn!("no certificate or publication number in {source_uri}");
        }

        let patent_type = PatentType::from_label(&first_non_empty(&root, KIND_LABEL))
            .unwrap_or(self.default_type);

        Ok(PatentRecord {
            patent_number,
            application_number: root.path_text(&["application-reference", "document-id", "doc-number"]),
            title: first_non_empty(&root, TITLE),
            abstract_text: block_text(&root, "abstract"),
            description: block_text(&root, "description"),
            claims: claims(&root),
            inventor: persons(&root, "inventors", "inventor"),
            applicant: persons(&root, "applicants", "applicant"),
            application_date: root.path_text(&["application-reference", "document-id", "date"]),
            publication_date: root.path_text(&["publication-reference", "document-id", "date"]),
            ipc_classification: root.path_text(&["classification-ipc", "main-classification"]),
            patent_type,
            source_uri: source_uri.to_string(),
        })
    }

    /// Parse every patent document under `dir`. Files that fail to parse are
    /// logged and left out of `records` but still count toward `attempted`.
    pub fn parse_directory(&self, dir: &Path, max_files: Option<usize>) -> ParseOutcome {
        let mut files = discover_patent_files(dir);
        info!("found {} XML files in {}", files.len(), dir.display());

        if let Some(max) = max_files {
            files.truncate(max);
            info!("limiting parse to {max} files");
        }

        let mut outcome = ParseOutcome {
            records: Vec::with_capacity(files.len()),
            attempted: files.len(),
        };

        for (i, file) in files.iter().enumerate() {
            let done = i + 1;
            if done % PROGRESS_INTERVAL == 0 {
                info!("parsed {done}/{} files", files.len());
            }
            match self.parse_file(file) {
                Ok(record) => outcome.records.push(record),
                Err(e) => error!("failed to parse {}: {e}", file.display()),
            }
        }

        info!(
            "parsed {}/{} patent documents",
            outcome.succeeded(),
            outcome.attempted
        );
        outcome
    }
}

/// Recursively list patent XML files under `dir` in a stable order, leaving
/// out the per-period manifest and schema files.
pub fn discover_patent_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("directory does not exist: {}", dir.display());
        return Vec::new();
    }

    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.ends_with(".xml") && !EXCLUDED_FILES.contains(&name.to_lowercase().as_str())
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Read a period's `index.xml` manifest. Any failure yields an empty list.
pub fn parse_index_manifest(path: &Path) -> Vec<ManifestEntry> {
    let root = match std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| Element::parse(&bytes))
    {
        Ok(root) => root,
        Err(e) => {
            error!("failed to read manifest {}: {e}", path.display());
            return Vec::new();
        }
    };

    let entries: Vec<ManifestEntry> = root
        .find_all(&["Patent"])
        .into_iter()
        .map(|p| ManifestEntry {
            application_number: p.path_text(&["ApplicationNum"]),
            patent_number: p.path_text(&["CertificateNum"]),
            title: p.path_text(&["InventionTitle"]),
            xml_filename: p.path_text(&["FileName"]),
        })
        .collect();

    debug!("manifest {} lists {} patents", path.display(), entries.len());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> PatentRecord {
        PatentXmlParser::new()
            .parse_bytes(xml.as_bytes(), "file:///test.xml")
            .unwrap()
    }

    #[test]
    fn test_publication_number_fallback() {
        let record = parse(
            r#"<tw-patent-grant>
                 <certificate-number><document-id><doc-number></doc-number></document-id></certificate-number>
                 <publication-reference><document-id><doc-number>I123456</doc-number></document-id></publication-reference>
               </tw-patent-grant>"#,
        );
        assert_eq!(record.patent_number, "I123456");
    }

    #[test]
    fn test_certificate_number_wins() {
        let record = parse(
            r#"<tw-patent-grant>
                 <publication-reference><document-id><doc-number>P1</doc-number><date>20251013</date></document-id></publication-reference>
                 <certificate-number><document-id><doc-number>I999</doc-number></document-id></certificate-number>
               </tw-patent-grant>"#,
        );
        assert_eq!(record.patent_number, "I999");
        assert_eq!(record.publication_date, "20251013");
    }

    #[test]
    fn test_title_prefers_localized() {
        let both = parse(
            r#"<doc><invention-title><chinese-title>散熱裝置</chinese-title><english-title>Heat sink</english-title></invention-title></doc>"#,
        );
        assert_eq!(both.title, "散熱裝置");

        let latin = parse(
            r#"<doc><invention-title><english-title>Heat sink</english-title></invention-title></doc>"#,
        );
        assert_eq!(latin.title, "Heat sink");
    }

    #[test]
    fn test_claims_keep_order_and_numbers() {
        let record = parse(
            r#"<doc><claims>
                 <claim num="1"><claim-text>一種裝置。</claim-text></claim>
                 <claim num="2">如請求項1之<b>裝置</b>。</claim>
                 <claim num="3"> </claim>
                 <claim>無編號</claim>
               </claims></doc>"#,
        );
        assert_eq!(
            record.claims,
            vec![
                "請求項1: 一種裝置。".to_string(),
                "請求項2: 如請求項1之裝置。".to_string(),
                "無編號".to_string(),
            ]
        );
    }

    #[test]
    fn test_persons_join_and_fall_back() {
        let record = parse(
            r#"<doc>
                 <applicants>
                   <applicant><chinese-name><last-name>台積電</last-name></chinese-name></applicant>
                   <applicant><english-name><last-name>ACME</last-name></english-name></applicant>
                   <applicant></applicant>
                 </applicants>
                 <inventors><inventor><chinese-name><last-name>王</last-name></chinese-name><english-name><last-name>WANG</last-name></english-name></inventor></inventors>
               </doc>"#,
        );
        assert_eq!(record.applicant, "台積電; ACME");
        assert_eq!(record.inventor, "王");
    }

    #[test]
    fn test_blocks_concatenate_paragraphs() {
        let record = parse(
            r#"<doc>
                 <abstract><p>第一段。</p><p>第二段。</p></abstract>
                 <description><technical-field><p>技術領域</p></technical-field></description>
                 <classification-ipc><main-classification>H01L 21/00</main-classification></classification-ipc>
               </doc>"#,
        );
        assert_eq!(record.abstract_text, "第一段。第二段。");
        assert_eq!(record.description, "技術領域");
        assert_eq!(record.ipc_classification, "H01L 21/00");
    }

    #[test]
    fn test_blank_document_still_emits_record() {
        let record = parse("<doc/>");
        assert!(record.is_blank());
        assert_eq!(record.patent_type, PatentType::Unknown);
        assert_eq!(record.source_uri, "file:///test.xml");
    }

    #[test]
    fn test_patent_type_from_label_or_default() {
        let parser = PatentXmlParser::with_default_type(PatentType::Invention);
        let labelled = parser
            .parse_bytes("<doc><patent-type>新型專利</patent-type></doc>".as_bytes(), "x")
            .unwrap();
        assert_eq!(labelled.patent_type, PatentType::Utility);

        let plain = parser.parse_bytes(b"<doc><kind>B</kind></doc>", "x").unwrap();
        assert_eq!(plain.patent_type, PatentType::Invention);
    }

    #[test]
    fn test_malformed_document_is_error() {
        let err = PatentXmlParser::new()
            .parse_bytes(b"<doc><abstract></doc>", "file:///bad.xml")
            .unwrap_err();
        assert!(matches!(err, GazetteError::Xml { .. }));
    }
}
