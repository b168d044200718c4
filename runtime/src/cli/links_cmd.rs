//! Discover and save period links without downloading.

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::config::Category;
use crate::crawler::YearSelection;

pub async fn run(category: &str, latest_only: bool, max_periods: usize) -> Result<()> {
    let category: Category = category.parse()?;
    let settings = super::load_settings()?;
    let pipeline = super::catalog_pipeline(settings).await?;

    let years = if latest_only {
        YearSelection::Latest
    } else {
        YearSelection::All
    };
    let index = pipeline.crawl(category, &years, Some(max_periods)).await?;
    let path = pipeline.store().links_path(category.as_str());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "category": category.as_str(),
            "periods": index.period_count(),
            "path": path.display().to_string(),
            "links": index,
        }));
        return Ok(());
    }

    if !output::is_quiet() {
        let s = Styled::new();
        for (year, entries) in index.iter() {
            println!("  {} {} periods", s.bold(year), entries.len());
            for entry in entries {
                println!(
                    "    {:<16} {:<10} {:>10}  {}",
                    entry.title,
                    entry.publication_date.as_deref().unwrap_or("-"),
                    entry.size_label.as_deref().unwrap_or("-"),
                    s.dim(&entry.transfer_url)
                );
            }
        }
        if index.is_empty() {
            println!("  {} no links discovered", s.warn_sym());
        }
        println!("  Saved to {}", path.display());
    }

    Ok(())
}
