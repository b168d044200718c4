//! Parse downloaded gazette XML into canonical records.

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::config::Category;

pub async fn run(category: &str, max_files: Option<usize>) -> Result<()> {
    let category: Category = category.parse()?;
    let settings = super::load_settings()?;
    let pipeline = super::saved_links_pipeline(settings, category.as_str())?;

    let outcome = pipeline.parse(category, max_files).await?;
    let path = pipeline.store().docs_path(category.as_str());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "category": category.as_str(),
            "attempted": outcome.attempted,
            "succeeded": outcome.succeeded(),
            "failed": outcome.failed(),
            "success_rate": outcome.success_rate(),
            "path": path.display().to_string(),
        }));
        return Ok(());
    }

    if !output::is_quiet() {
        let s = Styled::new();
        let sym = if outcome.failed() == 0 {
            s.ok_sym()
        } else {
            s.warn_sym()
        };
        println!(
            "  {sym} {}/{} documents parsed ({:.1}%)",
            outcome.succeeded(),
            outcome.attempted,
            outcome.success_rate() * 100.0
        );
        println!("  Saved to {}", path.display());
    }

    Ok(())
}
