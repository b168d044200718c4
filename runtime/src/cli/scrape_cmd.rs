//! Full acquisition for one category: crawl, download, parse.

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::config::Category;
use crate::orchestrator::ScrapeRequest;

pub async fn run(
    category: &str,
    latest_only: bool,
    max_periods: usize,
    max_files_per_period: usize,
    all_files: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let settings = super::load_settings()?;
    let pipeline = super::catalog_pipeline(settings).await?;

    let request = ScrapeRequest {
        category,
        latest_only,
        max_periods,
        max_files_per_period: Some(max_files_per_period),
        xml_only: !all_files,
    };
    let report = pipeline.scrape(&request).await?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
        return Ok(());
    }

    if !output::is_quiet() {
        let s = Styled::new();
        let dl = &report.download;
        println!();
        println!("  {} ({})", s.bold(&report.category), report.dataset_key);
        println!("    Periods discovered: {}", report.periods_discovered);
        println!(
            "    Periods downloaded: {}/{}",
            dl.completed_periods, dl.total_periods
        );
        println!(
            "    Files:              {} downloaded, {} present, {} failed",
            dl.success_files, dl.skipped_files, dl.failed_files
        );
        println!("    Documents parsed:   {}/{}", report.parsed, report.attempted);
        for error in &dl.errors {
            println!("    {} {error}", s.warn_sym());
        }
        if report.periods_discovered == 0 {
            println!("    {} no links discovered", s.warn_sym());
        }
    }

    Ok(())
}
