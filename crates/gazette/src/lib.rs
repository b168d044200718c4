//! Gazette: canonical patent records, XML parsing and retrieval chunking.

pub mod normalizer;
pub mod parser;
pub mod storage;
pub mod types;
pub mod xml;

pub use normalizer::{
    chunk_statistics, clean_text, ChunkStatistics, ChunkerConfig, DocumentNormalizer,
    SourceDocument,
};
pub use parser::{discover_patent_files, parse_index_manifest, ManifestEntry, ParseOutcome, PatentXmlParser};
pub use storage::{read_json, write_json, ArtifactStore};
pub use types::*;
