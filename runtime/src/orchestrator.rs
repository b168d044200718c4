// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

//! Stage sequencing for one category: crawl, download, parse, process.
//!
//! Stages run one after another. The blocking transfer client and the XML
//! parser run on the blocking pool so the runtime driving the browser stays
//! responsive.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use gazette::{
    chunk_statistics, ArtifactStore, BatchStats, ChunkStatistics, DocumentNormalizer, LinkIndex,
    ParseOutcome, PatentXmlParser, SourceDocument,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{Category, CategoryTable, Settings};
use crate::crawler::{LinkSource, YearSelection};
use crate::ftps::{BatchOptions, FtpsClient, SecureLayer};
use crate::ledger::{RunEntry, RunLedger};
use crate::progress::{Progress, ProgressEventKind, Stage};

/// Parameters of a full acquisition run for one category.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub category: Category,
    /// Only visit and download the most recent year.
    pub latest_only: bool,
    /// Periods extracted per year.
    pub max_periods: usize,
    /// Files downloaded per period.
    pub max_files_per_period: Option<usize>,
    /// Download only `.xml` files.
    pub xml_only: bool,
}

impl Default for ScrapeRequest {
    fn default() -> Self {
        Self {
            category: Category::Invention,
            latest_only: false,
            max_periods: 5,
            max_files_per_period: Some(100),
            xml_only: true,
        }
    }
}

/// What a scrape run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionReport {
    pub category: String,
    pub dataset_key: String,
    pub periods_discovered: usize,
    pub download: BatchStats,
    pub parsed: usize,
    pub attempted: usize,
}

/// Chunking outcome for one category.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryChunks {
    pub category: String,
    pub documents: usize,
    pub skipped_documents: usize,
    pub chunks: usize,
    pub output: PathBuf,
    pub statistics: Option<ChunkStatistics>,
}

/// Stage driver bound to one settings snapshot.
pub struct Pipeline {
    settings: Settings,
    categories: CategoryTable,
    source: Arc<dyn LinkSource>,
    layer: Arc<dyn SecureLayer>,
    store: ArtifactStore,
    progress: Progress,
    ledger: Option<Mutex<RunLedger>>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        categories: CategoryTable,
        source: Arc<dyn LinkSource>,
        layer: Arc<dyn SecureLayer>,
    ) -> Self {
        let store = settings.artifact_store();
        Self {
            settings,
            categories,
            source,
            layer,
            store,
            progress: Progress::disabled(),
            ledger: None,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_ledger(mut self, ledger: RunLedger) -> Self {
        self.ledger = Some(Mutex::new(ledger));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Discover period links for a category and save them as
    /// `<category>_links.json`.
    pub async fn crawl(
        &self,
        category: Category,
        years: &YearSelection,
        max_per_year: Option<usize>,
    ) -> Result<LinkIndex> {
        let dataset_key = self.categories.dataset_key(category)?;
        let started = self.stage_started(Stage::Crawl, format!("discovering {dataset_key}"));

        let index = self
            .source
            .discover(dataset_key, years, max_per_year)
            .await?;
        let path = self.store.save_links(category.as_str(), &index)?;

        let periods = index.period_count();
        self.stage_completed(Stage::Crawl, started, format!("{periods} periods -> {}", path.display()));
        self.record(RunEntry::new(
            category.as_str(),
            Stage::Crawl,
            periods,
            periods,
            0,
            0,
            started.elapsed(),
        ));
        Ok(index)
    }

    /// Transfer every period of `index` into the category's download
    /// directory.
    pub async fn download(
        &self,
        category: Category,
        index: LinkIndex,
        options: BatchOptions,
    ) -> Result<BatchStats> {
        let base_dir = self.store.download_dir(category.as_str());
        let started = self.stage_started(
            Stage::Download,
            format!("{} periods into {}", index.period_count(), base_dir.display()),
        );

        let layer = Arc::clone(&self.layer);
        let ftps_options = self.settings.ftps_options();
        let progress = self.progress.clone();
        let stats = tokio::task::spawn_blocking(move || {
            let mut client = FtpsClient::new(layer, ftps_options);
            client.download_from_link_index(&index, &base_dir, &options, &progress)
        })
        .await
        .context("download worker stopped unexpectedly")?;

        self.stage_completed(
            Stage::Download,
            started,
            format!(
                "{}/{} periods, {} downloaded, {} skipped, {} failed",
                stats.completed_periods,
                stats.total_periods,
                stats.success_files,
                stats.skipped_files,
                stats.failed_files
            ),
        );
        self.record(RunEntry::new(
            category.as_str(),
            Stage::Download,
            stats.total_files + stats.errors.len(),
            stats.success_files,
            stats.failed_files + stats.errors.len(),
            stats.skipped_files,
            started.elapsed(),
        ));
        Ok(stats)
    }

    /// Parse the category's download directory and save the records as
    /// `<category>_docs.json`.
    pub async fn parse(&self, category: Category, max_files: Option<usize>) -> Result<ParseOutcome> {
        let dir = self.store.download_dir(category.as_str());
        let started = self.stage_started(Stage::Parse, format!("parsing {}", dir.display()));

        let parser = PatentXmlParser::with_default_type(category.default_patent_type());
        let outcome = tokio::task::spawn_blocking(move || parser.parse_directory(&dir, max_files))
            .await
            .context("parse worker stopped unexpectedly")?;

        self.store.save_records(category.as_str(), &outcome.records)?;

        self.stage_completed(
            Stage::Parse,
            started,
            format!("{}/{} documents", outcome.succeeded(), outcome.attempted),
        );
        self.record(RunEntry::new(
            category.as_str(),
            Stage::Parse,
            outcome.attempted,
            outcome.succeeded(),
            outcome.failed(),
            0,
            started.elapsed(),
        ));
        Ok(outcome)
    }

    /// Full acquisition for one category: crawl, download, parse.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<AcquisitionReport> {
        let category = request.category;
        let dataset_key = self.categories.dataset_key(category)?.to_string();
        info!("scraping {category} ({dataset_key})");

        let years = if request.latest_only {
            YearSelection::Latest
        } else {
            YearSelection::All
        };
        let index = self
            .crawl(category, &years, Some(request.max_periods))
            .await?;

        let mut report = AcquisitionReport {
            category: category.to_string(),
            dataset_key,
            periods_discovered: index.period_count(),
            ..Default::default()
        };
        if index.is_empty() {
            error!("no links discovered for {category}");
            self.progress.warn(format!("no links discovered for {category}"));
            return Ok(report);
        }

        let options = batch_options(&index, request.latest_only, request.xml_only, request.max_files_per_period);
        report.download = self.download(category, index, options).await?;

        let outcome = self.parse(category, None).await?;
        report.parsed = outcome.succeeded();
        report.attempted = outcome.attempted;

        info!(
            "{category}: {} periods, {} files downloaded, {}/{} documents parsed",
            report.periods_discovered, report.download.success_files, report.parsed, report.attempted
        );
        Ok(report)
    }

    /// Chunk the records of each category into `<category>_chunks.json`.
    /// Without explicit categories, every `*_docs.json` in the raw directory
    /// is processed.
    pub async fn process(&self, categories: Option<&[String]>) -> Result<Vec<CategoryChunks>> {
        let normalizer = DocumentNormalizer::new(self.settings.chunker())?;
        let categories = match categories {
            Some(list) => list.to_vec(),
            None => self.store.document_categories()?,
        };

        let mut results = Vec::with_capacity(categories.len());
        for category in categories {
            let started = self.stage_started(Stage::Process, format!("chunking {category}"));
            let documents = self.store.load_documents(&category)?;
            let total = documents.len();

            let mut chunks = Vec::new();
            let mut skipped = 0;
            for (i, value) in documents.into_iter().enumerate() {
                match SourceDocument::from_value(value) {
                    Ok(doc) => chunks.extend(normalizer.normalize(&doc)),
                    Err(e) => {
                        warn!("{category}: skipping document {i}: {e}");
                        skipped += 1;
                    }
                }
            }

            let output = self.store.save_chunks(&category, &chunks)?;
            let statistics = chunk_statistics(&chunks);
            if let Some(stats) = &statistics {
                info!(
                    "{category}: {} chunks, avg {:.0} chars (min {}, max {})",
                    stats.total_chunks,
                    stats.avg_chunk_length,
                    stats.min_chunk_length,
                    stats.max_chunk_length
                );
            }

            self.stage_completed(
                Stage::Process,
                started,
                format!("{category}: {} chunks from {total} documents", chunks.len()),
            );
            self.record(RunEntry::new(
                &category,
                Stage::Process,
                total,
                total - skipped,
                skipped,
                0,
                started.elapsed(),
            ));
            results.push(CategoryChunks {
                category,
                documents: total,
                skipped_documents: skipped,
                chunks: chunks.len(),
                output,
                statistics,
            });
        }
        Ok(results)
    }

    fn stage_started(&self, stage: Stage, message: String) -> Instant {
        info!("{stage}: {message}");
        self.progress
            .emit(ProgressEventKind::StageStarted { stage, message });
        Instant::now()
    }

    fn stage_completed(&self, stage: Stage, started: Instant, message: String) {
        info!("{stage} done: {message}");
        self.progress.emit(ProgressEventKind::StageCompleted {
            stage,
            message,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    /// Ledger failures never fail a stage.
    fn record(&self, entry: RunEntry) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let result = match ledger.lock() {
            Ok(mut ledger) => ledger.record(&entry),
            Err(poisoned) => poisoned.into_inner().record(&entry),
        };
        if let Err(e) = result {
            warn!("could not append to run ledger: {e:#}");
        }
    }
}

/// Download selection for an index: XML-only when asked, and restricted to
/// the numerically latest year when `latest_only` is set. A file cap of zero
/// means no cap.
pub fn batch_options(
    index: &LinkIndex,
    latest_only: bool,
    xml_only: bool,
    max_files_per_period: Option<usize>,
) -> BatchOptions {
    BatchOptions {
        file_filter: xml_only.then(BatchOptions::xml_only),
        year_filter: if latest_only {
            index.latest_year().map(BatchOptions::single_year)
        } else {
            None
        },
        max_files_per_period: max_files_per_period.filter(|max| *max > 0),
    }
}
