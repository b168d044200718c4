//! Environment readiness check.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{self, Styled};
use crate::config::Settings;
use crate::ftps::ImplicitTls;
use crate::renderer::chromium::find_chromium;

/// Check configuration, Chromium availability, TLS setup and data
/// directories.
pub async fn run() -> Result<()> {
    let s = Styled::new();
    let settings = Settings::from_env();
    let chromium = find_chromium(
        settings
            .as_ref()
            .ok()
            .and_then(|cfg| cfg.chromium_path.as_deref()),
    );
    let tls = ImplicitTls::new();

    if output::is_json() {
        let settings_json = match &settings {
            Ok(cfg) => serde_json::json!({
                "ok": true,
                "data_dir": cfg.data_dir.display().to_string(),
                "raw_dir": cfg.raw_dir.display().to_string(),
                "processed_dir": cfg.processed_dir.display().to_string(),
                "catalog_url": cfg.catalog_url,
                "ftps_port": cfg.ftps_port,
                "chunk_size": cfg.chunk_size,
                "chunk_overlap": cfg.chunk_overlap,
            }),
            Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
        };
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "settings": settings_json,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "tls": tls.is_ok(),
            "ready": settings.is_ok() && chromium.is_some() && tls.is_ok(),
        }));
        return Ok(());
    }

    println!("Gazette Doctor");
    println!("==============");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &settings {
        Ok(cfg) => {
            println!("{} Configuration valid", s.ok_sym());
            println!("     Catalog:  {}", cfg.catalog_url);
            println!("     FTPS:     port {}, timeout {}s", cfg.ftps_port, cfg.ftps_timeout_secs);
            println!("     Chunking: {} chars, {} overlap", cfg.chunk_size, cfg.chunk_overlap);
            check_dir(&s, "Raw data directory", &cfg.raw_dir);
            check_dir(&s, "Processed directory", &cfg.processed_dir);
        }
        Err(e) => println!("{} Configuration invalid: {e}", s.warn_sym()),
    }

    match &chromium {
        Some(path) => println!("{} Chromium found: {}", s.ok_sym(), path.display()),
        None => println!(
            "{} Chromium NOT found. Set GAZETTE_CHROMIUM_PATH or install Chrome; `links` and `scrape` need it.",
            s.warn_sym()
        ),
    }

    match &tls {
        Ok(_) => println!("{} TLS client configuration ready", s.ok_sym()),
        Err(e) => println!("{} TLS setup failed: {e}", s.warn_sym()),
    }

    println!();
    if settings.is_ok() && chromium.is_some() && tls.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

/// Report whether `dir` exists or could be created under an existing parent.
fn check_dir(s: &Styled, label: &str, dir: &Path) {
    if dir.is_dir() {
        println!("{} {label}: {}", s.ok_sym(), dir.display());
        return;
    }
    let creatable = dir
        .ancestors()
        .skip(1)
        .map(|a| if a.as_os_str().is_empty() { Path::new(".") } else { a })
        .find(|a| a.exists())
        .is_some_and(|a| a.is_dir());
    if creatable {
        println!(
            "{} {label}: {} (created on first run)",
            s.ok_sym(),
            dir.display()
        );
    } else {
        println!("{} {label}: {} is not reachable", s.warn_sym(), dir.display());
    }
}
