//! Download the periods of a previously saved link index.

use anyhow::{Context, Result};

use crate::cli::output::{self, Styled};
use crate::config::Category;
use crate::orchestrator::batch_options;

pub async fn run(
    category: &str,
    latest_only: bool,
    max_files_per_period: usize,
    all_files: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let settings = super::load_settings()?;
    let pipeline = super::saved_links_pipeline(settings, category.as_str())?;

    let index = pipeline.store().load_links(category.as_str()).with_context(|| {
        format!("no saved links for {category}; run `gazette links {category}` first")
    })?;
    let options = batch_options(&index, latest_only, !all_files, Some(max_files_per_period));
    let stats = pipeline.download(category, index, options).await?;

    if output::is_json() {
        output::print_json(&serde_json::to_value(&stats)?);
        return Ok(());
    }

    if !output::is_quiet() {
        let s = Styled::new();
        println!(
            "  {} {}/{} periods, {} downloaded, {} present, {} failed",
            if stats.errors.is_empty() && stats.failed_files == 0 {
                s.ok_sym()
            } else {
                s.warn_sym()
            },
            stats.completed_periods,
            stats.total_periods,
            stats.success_files,
            stats.skipped_files,
            stats.failed_files
        );
        for error in &stats.errors {
            println!("    {error}");
        }
    }

    Ok(())
}
