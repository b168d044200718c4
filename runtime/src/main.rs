// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use gazette_runtime::cli;

#[derive(Parser)]
#[command(
    name = "gazette",
    about = "Gazette: patent gazette acquisition pipeline",
    version,
    after_help = "Run 'gazette <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl, download and parse one category
    Scrape {
        /// Category (invention, utility, design, invention_pub, all)
        #[arg(long, alias = "section", default_value = "invention")]
        category: String,
        /// Only the most recent year
        #[arg(long)]
        latest_only: bool,
        /// Maximum periods per year
        #[arg(long, default_value = "5")]
        max_periods: usize,
        /// Maximum files per period
        #[arg(long, default_value = "100")]
        max_files_per_period: usize,
        /// Download every file, not only XML
        #[arg(long)]
        all_files: bool,
    },
    /// Discover period links and save them
    Links {
        /// Category (invention, utility, design, invention_pub, all)
        #[arg(default_value = "invention")]
        category: String,
        /// Only the most recent year
        #[arg(long)]
        latest_only: bool,
        /// Maximum periods per year
        #[arg(long, default_value = "5")]
        max_periods: usize,
    },
    /// Download the periods of the saved link index
    Download {
        /// Category (invention, utility, design, invention_pub, all)
        #[arg(default_value = "invention")]
        category: String,
        /// Only the most recent year
        #[arg(long)]
        latest_only: bool,
        /// Maximum files per period
        #[arg(long, default_value = "100")]
        max_files_per_period: usize,
        /// Download every file, not only XML
        #[arg(long)]
        all_files: bool,
    },
    /// Parse downloaded XML into canonical records
    Parse {
        /// Category (invention, utility, design, invention_pub, all)
        #[arg(default_value = "invention")]
        category: String,
        /// Parse at most this many files
        #[arg(long)]
        max_files: Option<usize>,
    },
    /// Chunk saved records (all categories when none given)
    Process {
        /// Categories to process
        categories: Vec<String>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, quiet: bool, json: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gazette_runtime={level},gazette={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("GAZETTE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("GAZETTE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("GAZETTE_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("GAZETTE_NO_COLOR", "1");
    }

    init_tracing(cli.verbose, cli.quiet, cli.json);

    let result = match cli.command {
        Commands::Scrape {
            category,
            latest_only,
            max_periods,
            max_files_per_period,
            all_files,
        } => {
            cli::scrape_cmd::run(
                &category,
                latest_only,
                max_periods,
                max_files_per_period,
                all_files,
            )
            .await
        }
        Commands::Links {
            category,
            latest_only,
            max_periods,
        } => cli::links_cmd::run(&category, latest_only, max_periods).await,
        Commands::Download {
            category,
            latest_only,
            max_files_per_period,
            all_files,
        } => cli::download_cmd::run(&category, latest_only, max_files_per_period, all_files).await,
        Commands::Parse {
            category,
            max_files,
        } => cli::parse_cmd::run(&category, max_files).await,
        Commands::Process { categories } => cli::process_cmd::run(&categories).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "gazette", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
