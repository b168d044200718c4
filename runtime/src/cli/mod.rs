//! CLI subcommand implementations for the `gazette` binary.

pub mod doctor;
pub mod download_cmd;
pub mod links_cmd;
pub mod output;
pub mod parse_cmd;
pub mod process_cmd;
pub mod scrape_cmd;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use crate::config::{CategoryTable, Settings};
use crate::crawler::{CatalogCrawler, CrawlTimings, FileLinkSource, LinkSource};
use crate::ftps::{ImplicitTls, SecureLayer};
use crate::ledger::RunLedger;
use crate::orchestrator::Pipeline;
use crate::progress::{self, Progress, ProgressEvent, ProgressEventKind};
use crate::renderer::chromium::ChromiumRenderer;
use output::Styled;

/// Settings from the environment; configuration errors surface before any
/// network activity.
pub fn load_settings() -> Result<Settings> {
    Settings::from_env().context("invalid configuration")
}

/// Pipeline that discovers links by rendering the live catalog.
pub async fn catalog_pipeline(settings: Settings) -> Result<Pipeline> {
    let renderer = ChromiumRenderer::new(settings.chromium_path.as_deref()).await?;
    let crawler = CatalogCrawler::new(Arc::new(renderer), settings.datasets()).with_timings(
        CrawlTimings {
            page_timeout: Duration::from_millis(settings.page_timeout_ms),
            ..CrawlTimings::default()
        },
    );
    assemble(settings, Arc::new(crawler))
}

/// Pipeline that replays the saved link index of `category` instead of
/// launching a browser.
pub fn saved_links_pipeline(settings: Settings, category: &str) -> Result<Pipeline> {
    let links = settings.artifact_store().links_path(category);
    assemble(settings, Arc::new(FileLinkSource::new(links)))
}

fn assemble(settings: Settings, source: Arc<dyn LinkSource>) -> Result<Pipeline> {
    let layer: Arc<dyn SecureLayer> =
        Arc::new(ImplicitTls::new().context("initializing TLS")?);
    let ledger = RunLedger::open(&settings.ledger_path())?;
    Ok(Pipeline::new(settings, CategoryTable::default(), source, layer)
        .with_ledger(ledger)
        .with_progress(progress_printer()))
}

/// Progress emitter whose events are echoed to stderr, unless output is
/// quiet or machine-readable.
fn progress_printer() -> Progress {
    if output::is_quiet() || output::is_json() {
        return Progress::disabled();
    }
    let (tx, mut rx) = progress::channel();
    let run_id = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
    tokio::spawn(async move {
        let s = Styled::new();
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&s, &event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
    Progress::new(tx, run_id)
}

fn print_event(s: &Styled, event: &ProgressEvent) {
    match &event.event {
        ProgressEventKind::StageStarted { stage, message } => {
            eprintln!("  {} {message}", s.bold(stage.as_str()));
        }
        ProgressEventKind::StageCompleted {
            stage,
            message,
            duration_ms,
        } => {
            eprintln!(
                "  {} {stage}: {message} {}",
                s.ok_sym(),
                s.dim(&format!("({:.1}s)", *duration_ms as f64 / 1000.0))
            );
        }
        ProgressEventKind::PeriodDownloaded {
            year,
            title,
            total,
            success,
            failed,
            skipped,
        } => {
            let sym = if *failed == 0 { s.ok_sym() } else { s.warn_sym() };
            eprintln!(
                "    {sym} {year} {title}: {success} new, {skipped} present, {failed} failed of {total}"
            );
        }
        ProgressEventKind::Warning { message } => {
            eprintln!("    {} {message}", s.warn_sym());
        }
    }
}
