// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

//! Runtime settings, category routing and dataset catalog paths.
//!
//! Everything is read from environment variables once at startup; unset
//! variables fall back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gazette::{ArtifactStore, ChunkerConfig, PatentType};
use thiserror::Error;

use crate::ftps::{FtpsOptions, IMPLICIT_FTPS_PORT};

/// Public catalog the dataset paths are resolved against.
pub const DEFAULT_CATALOG_URL: &str = "https://cloud.tipo.gov.tw/S220/opdata";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown category '{name}' (expected one of: {expected})")]
    UnknownCategory { name: String, expected: String },

    #[error("no dataset configured for category '{0}'")]
    UnmappedCategory(String),

    #[error("unknown dataset key '{0}'")]
    UnknownDataset(String),

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid chunking: {0}")]
    InvalidChunking(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Gazette category names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Invention,
    Utility,
    Design,
    InventionPub,
    All,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Invention,
        Self::Utility,
        Self::Design,
        Self::InventionPub,
        Self::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invention => "invention",
            Self::Utility => "utility",
            Self::Design => "design",
            Self::InventionPub => "invention_pub",
            Self::All => "all",
        }
    }

    /// Patent type stamped on records parsed from this category when the
    /// document itself carries no type label.
    pub fn default_patent_type(self) -> PatentType {
        match self {
            Self::Invention | Self::InventionPub => PatentType::Invention,
            Self::Utility => PatentType::Utility,
            Self::Design => PatentType::Design,
            Self::All => PatentType::Unknown,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownCategory {
                name: s.to_string(),
                expected: Self::ALL.map(Category::as_str).join(", "),
            })
    }
}

/// Category → dataset key.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    routes: Vec<(Category, String)>,
}

impl Default for CategoryTable {
    fn default() -> Self {
        let route = |c: Category, key: &str| (c, key.to_string());
        Self {
            routes: vec![
                route(Category::Invention, "patent_announce_xml_single"),
                route(Category::Utility, "patent_announce_xml_single"),
                route(Category::Design, "patent_announce_xml_single"),
                route(Category::InventionPub, "invention_pub_xml_single"),
                route(Category::All, "patent_announce_xml_single"),
            ],
        }
    }
}

impl CategoryTable {
    pub fn dataset_key(&self, category: Category) -> Result<&str, ConfigError> {
        self.routes
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, key)| key.as_str())
            .ok_or_else(|| ConfigError::UnmappedCategory(category.to_string()))
    }
}

/// Dataset key → catalog page path.
#[derive(Debug, Clone)]
pub struct DatasetTable {
    base_url: String,
    paths: Vec<(String, String)>,
}

const DATASET_PATHS: [(&str, &str); 10] = [
    ("patent_announce_xml_single", "detail/PatentIsuRegSpecXMLA"),
    ("patent_announce_xml_volume", "detail/PatentIsuRegSpecXMLB"),
    ("patent_announce_scan_single", "detail/PatentIsuRegSpecSTIFF"),
    ("patent_announce_scan_multi", "detail/PatentIsuRegSpecMTIFF"),
    ("invention_pub_xml_single", "detail/InventionPubXMLA"),
    ("invention_pub_xml_volume", "detail/InventionPubXMLB"),
    ("invention_pub_scan_single", "detail/InventionPubSTIFF"),
    ("invention_pub_scan_multi", "detail/InventionPubMTIFF"),
    ("trademark_reg_xml_single", "detail/TrademarkRegXMLA"),
    ("trademark_reg_xml_volume", "detail/TrademarkRegXMLB"),
];

impl DatasetTable {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            paths: DATASET_PATHS
                .iter()
                .map(|(k, p)| (k.to_string(), p.to_string()))
                .collect(),
        }
    }

    /// Catalog page path for a dataset key.
    pub fn path(&self, key: &str) -> Result<&str, ConfigError> {
        self.paths
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.as_str())
            .ok_or_else(|| ConfigError::UnknownDataset(key.to_string()))
    }

    /// Absolute catalog page URL for a dataset key.
    pub fn url(&self, key: &str) -> Result<String, ConfigError> {
        Ok(format!("{}/{}", self.base_url, self.path(key)?))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|(k, _)| k.as_str())
    }
}

impl Default for DatasetTable {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_URL)
    }
}

/// Process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub catalog_url: String,
    pub ftps_port: u16,
    pub ftps_timeout_secs: u64,
    pub ftps_user: String,
    pub ftps_password: String,
    pub page_timeout_ms: u64,
    pub chromium_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            raw_dir: data_dir.join("raw"),
            processed_dir: data_dir.join("processed"),
            data_dir,
            chunk_size: 1000,
            chunk_overlap: 100,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            ftps_port: IMPLICIT_FTPS_PORT,
            ftps_timeout_secs: 300,
            ftps_user: "anonymous".to_string(),
            ftps_password: "anonymous@".to_string(),
            page_timeout_ms: 30_000,
            chromium_path: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment and validate them.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = var("GAZETTE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let settings = Self {
            raw_dir: var("GAZETTE_RAW_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("raw")),
            processed_dir: var("GAZETTE_PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("processed")),
            data_dir,
            chunk_size: parse_var(&var, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var(&var, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
            catalog_url: var("GAZETTE_CATALOG_URL").unwrap_or(defaults.catalog_url),
            ftps_port: parse_var(&var, "GAZETTE_FTPS_PORT", defaults.ftps_port)?,
            ftps_timeout_secs: parse_var(
                &var,
                "GAZETTE_FTPS_TIMEOUT_SECS",
                defaults.ftps_timeout_secs,
            )?,
            ftps_user: var("GAZETTE_FTPS_USER").unwrap_or(defaults.ftps_user),
            ftps_password: var("GAZETTE_FTPS_PASSWORD").unwrap_or(defaults.ftps_password),
            page_timeout_ms: parse_var(&var, "GAZETTE_PAGE_TIMEOUT_MS", defaults.page_timeout_ms)?,
            chromium_path: var("GAZETTE_CHROMIUM_PATH").map(PathBuf::from),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Settings rooted at a custom data directory, everything else default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            raw_dir: data_dir.join("raw"),
            processed_dir: data_dir.join("processed"),
            data_dir,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunker()
            .validate()
            .map_err(|e| ConfigError::InvalidChunking(e.to_string()))?;
        if self.ftps_port == 0 {
            return Err(ConfigError::InvalidValue {
                name: "GAZETTE_FTPS_PORT",
                value: "0".into(),
            });
        }
        if self.ftps_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "GAZETTE_FTPS_TIMEOUT_SECS",
                value: "0".into(),
            });
        }
        if self.ftps_user.is_empty() {
            return Err(ConfigError::Empty("GAZETTE_FTPS_USER"));
        }
        if self.catalog_url.is_empty() {
            return Err(ConfigError::Empty("GAZETTE_CATALOG_URL"));
        }
        Ok(())
    }

    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    pub fn ftps_options(&self) -> FtpsOptions {
        FtpsOptions {
            default_port: self.ftps_port,
            timeout: Duration::from_secs(self.ftps_timeout_secs),
            user: self.ftps_user.clone(),
            password: self.ftps_password.clone(),
        }
    }

    pub fn datasets(&self) -> DatasetTable {
        DatasetTable::new(&self.catalog_url)
    }

    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.raw_dir, &self.processed_dir)
    }

    /// Append-only run ledger location.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("runs.jsonl")
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}
