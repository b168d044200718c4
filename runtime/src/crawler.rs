// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

//! Link discovery over the rendered open-data catalog.
//!
//! The catalog is a script-driven page: a year `<select>` swaps the list of
//! period anchors client-side, so the page must be rendered and driven
//! rather than fetched. Extraction is best-effort: any rendering failure
//! yields an empty index for the whole invocation.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gazette::{read_json, LinkEntry, LinkIndex};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::DatasetTable;
use crate::renderer::{RenderContext, Renderer};

/// Which catalog years to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearSelection {
    /// Every year offered by the catalog.
    All,
    /// The first year option in document order.
    Latest,
    /// Only these years, visited in catalog order.
    Years(Vec<String>),
}

impl YearSelection {
    /// Narrow the available years to the ones this selection targets.
    pub fn resolve(&self, available: &[String]) -> Vec<String> {
        match self {
            Self::All => available.to_vec(),
            Self::Latest => available.iter().take(1).cloned().collect(),
            Self::Years(wanted) => available
                .iter()
                .filter(|y| wanted.contains(y))
                .cloned()
                .collect(),
        }
    }
}

/// Anything that can produce a link index for a dataset.
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Discover period links for `dataset_key`. `max_per_year` caps the
    /// number of extracted periods per year.
    ///
    /// Errors are reserved for bad input such as an unknown dataset key;
    /// a catalog that cannot be rendered yields an empty index.
    async fn discover(
        &self,
        dataset_key: &str,
        years: &YearSelection,
        max_per_year: Option<usize>,
    ) -> Result<LinkIndex>;
}

/// Fixed waits applied while driving the catalog page.
#[derive(Debug, Clone, Copy)]
pub struct CrawlTimings {
    /// Upper bound for the initial page load.
    pub page_timeout: Duration,
    /// Settle time after the initial load, for the year list to populate.
    pub load_settle: Duration,
    /// Settle time after switching years, for the anchors to re-render.
    pub year_settle: Duration,
}

impl Default for CrawlTimings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_millis(30_000),
            load_settle: Duration::from_millis(3_000),
            year_settle: Duration::from_millis(2_000),
        }
    }
}

/// Browser-driven catalog crawler.
pub struct CatalogCrawler {
    renderer: Arc<dyn Renderer>,
    datasets: DatasetTable,
    timings: CrawlTimings,
}

/// Year option labels, in document order.
const YEAR_OPTIONS_JS: &str = r#"
Array.from(document.querySelectorAll('select option'))
    .map(o => (o.label || o.textContent || '').trim())
"#;

/// Anchors pointing at transfer endpoints, each with the flattened text of
/// its grandparent element.
const TRANSFER_ANCHORS_JS: &str = r#"
Array.from(document.querySelectorAll('a[href^="ftps://"]')).map(a => {
    const container = (a.parentElement && a.parentElement.parentElement)
        || a.parentElement || a;
    return {
        href: a.getAttribute('href') || '',
        text: container.innerText || container.textContent || ''
    };
})
"#;

/// Selects `year` in the first `<select>` by option label and fires the
/// events the page listens for. Evaluates to whether the option existed.
fn select_year_js(year: &str) -> String {
    let label = serde_json::to_string(year).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
    const select = document.querySelector('select');
    if (!select) return false;
    const option = Array.from(select.options)
        .find(o => (o.label || o.textContent || '').trim() === {label});
    if (!option) return false;
    select.value = option.value;
    option.selected = true;
    select.dispatchEvent(new Event('input', {{ bubbles: true }}));
    select.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
    )
}

#[derive(Debug, Deserialize)]
struct AnchorInfo {
    #[serde(default)]
    href: String,
    #[serde(default)]
    text: String,
}

impl CatalogCrawler {
    pub fn new(renderer: Arc<dyn Renderer>, datasets: DatasetTable) -> Self {
        Self {
            renderer,
            datasets,
            timings: CrawlTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: CrawlTimings) -> Self {
        self.timings = timings;
        self
    }

    async fn crawl(
        &self,
        url: &str,
        years: &YearSelection,
        max_per_year: Option<usize>,
    ) -> Result<LinkIndex> {
        let mut ctx = self.renderer.new_context().await?;
        let result = self.crawl_in(ctx.as_mut(), url, years, max_per_year).await;
        if let Err(e) = ctx.close().await {
            debug!("closing catalog context: {e}");
        }
        result
    }

    async fn crawl_in(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        years: &YearSelection,
        max_per_year: Option<usize>,
    ) -> Result<LinkIndex> {
        info!("loading catalog {url}");
        let nav = ctx
            .navigate(url, self.timings.page_timeout.as_millis() as u64)
            .await
            .with_context(|| format!("loading {url}"))?;
        debug!("catalog loaded in {}ms", nav.load_time_ms);
        tokio::time::sleep(self.timings.load_settle).await;

        let labels: Vec<String> = serde_json::from_value(ctx.execute_js(YEAR_OPTIONS_JS).await?)
            .context("year options")?;
        let available: Vec<String> = labels.into_iter().filter(|l| is_year_label(l)).collect();
        let targets = years.resolve(&available);
        info!(
            "{} years available, visiting {}",
            available.len(),
            targets.join(", ")
        );

        let mut index = LinkIndex::new();
        for year in targets {
            let selected = ctx.execute_js(&select_year_js(&year)).await?;
            if selected.as_bool() != Some(true) {
                bail!("year option {year} disappeared from the catalog");
            }
            tokio::time::sleep(self.timings.year_settle).await;

            let anchors: Vec<AnchorInfo> =
                serde_json::from_value(ctx.execute_js(TRANSFER_ANCHORS_JS).await?)
                    .context("transfer anchors")?;

            let mut entries = Vec::new();
            for anchor in anchors {
                if max_per_year.is_some_and(|max| entries.len() >= max) {
                    break;
                }
                match extract_entry(&year, &anchor.href, &anchor.text) {
                    Some(entry) => entries.push(entry),
                    None => warn!("{year}: no volume/issue near {}", anchor.href),
                }
            }
            info!("{year}: {} periods", entries.len());
            index.insert_year(year, entries);
        }
        Ok(index)
    }
}

#[async_trait]
impl LinkSource for CatalogCrawler {
    async fn discover(
        &self,
        dataset_key: &str,
        years: &YearSelection,
        max_per_year: Option<usize>,
    ) -> Result<LinkIndex> {
        let url = self.datasets.url(dataset_key)?;
        match self.crawl(&url, years, max_per_year).await {
            Ok(index) => Ok(index),
            Err(e) => {
                error!("catalog crawl failed for {dataset_key}: {e:#}");
                Ok(LinkIndex::new())
            }
        }
    }
}

/// Replays a previously saved link index instead of rendering the catalog.
pub struct FileLinkSource {
    path: PathBuf,
}

impl FileLinkSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LinkSource for FileLinkSource {
    async fn discover(
        &self,
        dataset_key: &str,
        years: &YearSelection,
        max_per_year: Option<usize>,
    ) -> Result<LinkIndex> {
        let saved: LinkIndex = read_json(&self.path)
            .with_context(|| format!("reading link index {}", self.path.display()))?;
        debug!("replaying {} for {dataset_key}", self.path.display());

        // Saved indexes may be hand-edited, so "latest" is the numerically
        // greatest key rather than the first one.
        let available: Vec<String> = match years {
            YearSelection::Latest => saved.latest_year().map(str::to_string).into_iter().collect(),
            other => other.resolve(&saved.years().map(str::to_string).collect::<Vec<_>>()),
        };

        let mut index = LinkIndex::new();
        for year in available {
            let entries = saved.get(&year).unwrap_or_default();
            let keep = max_per_year.unwrap_or(entries.len()).min(entries.len());
            index.insert_year(year, entries[..keep].to_vec());
        }
        Ok(index)
    }
}

fn is_year_label(label: &str) -> bool {
    !label.is_empty() && label.chars().all(|c| c.is_ascii_digit())
}

fn volume_issue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Vol\.\s*(\d+),\s*Iss\.\s*(\d+)").expect("valid regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{3}-\d{2}-\d{2})").expect("valid regex"))
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*([0-9.]+\s*[KMGT]?B)\s*\)").expect("valid regex"))
}

/// Build a link entry from an anchor's href and the text around it.
/// Returns `None` when the text carries no volume/issue marker.
pub fn extract_entry(year: &str, href: &str, context: &str) -> Option<LinkEntry> {
    let caps = volume_issue_re().captures(context)?;
    let volume = caps[1].to_string();
    let issue = caps[2].to_string();
    Some(LinkEntry {
        year: year.to_string(),
        title: format!("第 {volume} 卷 {issue} 期"),
        volume,
        issue,
        publication_date: date_re().captures(context).map(|c| c[1].to_string()),
        size_label: size_re().captures(context).map(|c| c[1].to_string()),
        transfer_url: href.to_string(),
    })
}
