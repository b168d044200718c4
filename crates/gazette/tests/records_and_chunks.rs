//! Parse-to-chunk integration tests.
//!
//! Builds a small gazette period on disk, parses it into canonical records,
//! persists them, then chunks the persisted artifact the way the `process`
//! stage does.

use std::collections::HashMap;
use std::path::Path;

use gazette::{
    chunk_statistics, parse_index_manifest, ArtifactStore, ChunkerConfig, DocumentNormalizer,
    PatentType, PatentXmlParser,
};
use tempfile::TempDir;

// ── Fixtures ──

fn patent_xml(number: &str, claims: usize, abstract_text: &str) -> String {
    let claims: String = (1..=claims)
        .map(|n| format!(r#"<claim num="{n}"><claim-text>第{n}項請求內容。</claim-text></claim>"#))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<tw-patent-grant>
  <bibliographic-data>
    <certificate-number><document-id><doc-number>{number}</doc-number></document-id></certificate-number>
    <application-reference><document-id><doc-number>111100001</doc-number><date>20220101</date></document-id></application-reference>
    <classification-ipc><main-classification>G06F 16/33</main-classification></classification-ipc>
    <invention-title><chinese-title>檢索系統</chinese-title><english-title>Retrieval system</english-title></invention-title>
    <applicants><applicant><chinese-name><last-name>某公司</last-name></chinese-name></applicant></applicants>
    <inventors>
      <inventor><chinese-name><last-name>陳</last-name></chinese-name></inventor>
      <inventor><english-name><last-name>LIN</last-name></english-name></inventor>
    </inventors>
  </bibliographic-data>
  <abstract><p>{abstract_text}</p></abstract>
  <claims>{claims}</claims>
</tw-patent-grant>"#
    )
}

fn write(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn build_period(root: &Path) {
    let period = root.join("114").join("vol52_iss29");
    write(&period.join("I100001.xml"), &patent_xml("I100001", 3, "短摘要。"));
    write(&period.join("sub").join("I100002.xml"), &patent_xml("I100002", 1, &"長".repeat(2500)));
    write(&period.join("broken.xml"), "<tw-patent-grant><abstract>");
    write(&period.join("index.xml"), r#"<Patents>
  <Patent><ApplicationNum>111100001</ApplicationNum><CertificateNum>I100001</CertificateNum><InventionTitle>檢索系統</InventionTitle><FileName>I100001.xml</FileName></Patent>
</Patents>"#);
    write(&period.join("patent.dtd"), "<!ELEMENT tw-patent-grant ANY>");
    write(&period.join("notes.XML"), "<x/>");
}

// ── Parser ──

#[test]
fn test_parse_directory_skips_auxiliary_and_broken_files() {
    let dir = TempDir::new().unwrap();
    build_period(dir.path());

    let parser = PatentXmlParser::with_default_type(PatentType::Invention);
    let outcome = parser.parse_directory(dir.path(), None);

    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.succeeded(), 2);
    assert_eq!(outcome.failed(), 1);
    assert!((outcome.success_rate() - 2.0 / 3.0).abs() < 1e-9);

    let first = &outcome.records[0];
    assert_eq!(first.patent_number, "I100001");
    assert_eq!(first.title, "檢索系統");
    assert_eq!(first.inventor, "陳; LIN");
    assert_eq!(first.applicant, "某公司");
    assert_eq!(first.application_number, "111100001");
    assert_eq!(first.application_date, "20220101");
    assert_eq!(first.ipc_classification, "G06F 16/33");
    assert_eq!(first.patent_type, PatentType::Invention);
    assert!(first.source_uri.starts_with("file:///"));
    assert!(first.source_uri.ends_with("I100001.xml"));
    assert_eq!(
        first.claims,
        vec![
            "請求項1: 第1項請求內容。",
            "請求項2: 第2項請求內容。",
            "請求項3: 第3項請求內容。",
        ]
    );
}

#[test]
fn test_parse_directory_honors_cap_and_missing_dir() {
    let dir = TempDir::new().unwrap();
    build_period(dir.path());

    let parser = PatentXmlParser::new();
    let capped = parser.parse_directory(dir.path(), Some(1));
    assert_eq!(capped.attempted, 1);

    let missing = parser.parse_directory(&dir.path().join("nope"), None);
    assert_eq!(missing.attempted, 0);
    assert_eq!(missing.success_rate(), 1.0);
}

#[test]
fn test_index_manifest() {
    let dir = TempDir::new().unwrap();
    build_period(dir.path());

    let entries = parse_index_manifest(&dir.path().join("114/vol52_iss29/index.xml"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].patent_number, "I100001");
    assert_eq!(entries[0].xml_filename, "I100001.xml");

    assert!(parse_index_manifest(&dir.path().join("missing.xml")).is_empty());
}

// ── Normalizer ──

#[test]
fn test_unbroken_text_overlaps_exactly() {
    let normalizer = DocumentNormalizer::new(ChunkerConfig::default()).unwrap();
    let text = "x".repeat(2500);
    let chunks = normalizer.split_text(&text);

    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    for pair in chunks.windows(2) {
        let tail: String = pair[0].chars().skip(pair[0].chars().count() - 100).collect();
        let head: String = pair[1].chars().take(100).collect();
        assert_eq!(tail, head);
    }
    assert_eq!(chunks[2].chars().count(), 700);
}

#[test]
fn test_records_to_chunks_through_artifacts() {
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    build_period(&downloads);

    let store = ArtifactStore::new(dir.path().join("raw"), dir.path().join("processed"));
    let outcome = PatentXmlParser::with_default_type(PatentType::Utility).parse_directory(&downloads, None);
    store.save_records("utility", &outcome.records).unwrap();

    let normalizer = DocumentNormalizer::new(ChunkerConfig::default()).unwrap();
    let documents = store.load_documents("utility").unwrap();
    let chunks = normalizer.normalize_values(documents);
    store.save_chunks("utility", &chunks).unwrap();

    // Every (patent, part) group is numbered 0..K-1 with total K.
    let mut groups: HashMap<(String, String), Vec<(usize, usize)>> = HashMap::new();
    for chunk in &chunks {
        let meta = &chunk.metadata;
        assert_eq!(meta.section, "utility");
        groups
            .entry((meta.patent_number.clone().unwrap(), meta.part.clone().unwrap()))
            .or_default()
            .push((meta.chunk_index, meta.total_chunks));
    }
    for ((_, _), entries) in &groups {
        let k = entries.len();
        let indices: Vec<usize> = entries.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..k).collect::<Vec<_>>());
        assert!(entries.iter().all(|(_, total)| *total == k));
    }

    let long_abstract = &groups[&("I100002".to_string(), "abstract".to_string())];
    assert_eq!(long_abstract.len(), 3);

    assert_eq!(store.chunk_categories().unwrap(), vec!["utility"]);
    let reloaded = store.load_chunks("utility").unwrap();
    assert_eq!(reloaded, chunks);

    let stats = chunk_statistics(&reloaded).unwrap();
    assert_eq!(stats.total_chunks, chunks.len());
    assert_eq!(stats.max_chunk_length, 1000);
    assert_eq!(stats.sections, vec!["utility"]);
}
