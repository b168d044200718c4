//! Chunk saved records into retrieval units.

use anyhow::Result;

use crate::cli::output::{self, Styled};

pub async fn run(categories: &[String]) -> Result<()> {
    let settings = super::load_settings()?;
    let pipeline = super::saved_links_pipeline(settings, "all")?;

    let requested = (!categories.is_empty()).then_some(categories);
    let results = pipeline.process(requested).await?;

    if output::is_json() {
        output::print_json(&serde_json::json!({ "categories": results }));
        return Ok(());
    }

    if !output::is_quiet() {
        let s = Styled::new();
        if results.is_empty() {
            println!("  {} no record files found", s.warn_sym());
        }
        for result in &results {
            println!(
                "  {} {}: {} chunks from {} documents",
                s.ok_sym(),
                s.bold(&result.category),
                result.chunks,
                result.documents
            );
            if let Some(stats) = &result.statistics {
                println!(
                    "      avg {:.0} chars, min {}, max {}, sections: {}",
                    stats.avg_chunk_length,
                    stats.min_chunk_length,
                    stats.max_chunk_length,
                    stats.sections.join(", ")
                );
            }
            if result.skipped_documents > 0 {
                println!(
                    "      {} {} documents skipped",
                    s.warn_sym(),
                    result.skipped_documents
                );
            }
        }
    }

    Ok(())
}
