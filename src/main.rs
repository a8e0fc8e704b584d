mod config;
mod driver;
mod errors;
mod export;
mod extract;
mod loader;
mod models;
mod navigator;
mod pipeline;
mod storage;
mod utils;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::loader::{discover_exports, read_json, summarize};
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "courtside-etl", about = "NBA stats, schedule and standings scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every configured source (or only the named ones) and export
    Scrape {
        /// Source name, repeatable
        #[arg(short, long)]
        source: Vec<String>,
    },

    /// Summarize exported JSON files (a file, or every export in a directory)
    Inspect {
        #[arg(default_value = "data")]
        path: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,

    /// List configured sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "courtside_etl=info,warn",
        1 => "courtside_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { source } => {
            let timer = utils::Timer::start("Scrape");
            let sources = config.selected_sources(&source);
            if sources.is_empty() {
                bail!("No configured source matches {:?}", source);
            }

            let stats = Pipeline::new(config).run(sources).await?;
            info!(
                "Done: {} sources, {} records, {} failed in {:.1?}",
                stats.sources_attempted,
                stats.records_exported,
                stats.failed.len(),
                timer.elapsed()
            );
            if stats.failed.len() == stats.sources_attempted {
                bail!("Every source failed");
            }
        }

        Command::Inspect { path } => {
            let files = if path.is_dir() {
                discover_exports(&path)?
            } else {
                vec![path.clone()]
            };
            if files.is_empty() {
                println!("No exports in {:?} — run `courtside-etl scrape` first.", path);
            }

            for file in &files {
                let summary = summarize(&read_json(file)?);
                println!("─────────────────────────────────");
                println!("  {}", summary.source);
                println!("─────────────────────────────────");
                println!("  Records : {}", utils::fmt_number(summary.records as i64));
                println!("  Fields  : {}", summary.fields.join(", "));
                for (field, values) in &summary.provenance {
                    let values: Vec<&str> = values.iter().map(String::as_str).collect();
                    println!("  {:<8}: {}", field, values.join(", "));
                }
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let runs = repo.run_count()?;
            let records = repo.record_count()?;
            let last = repo.last_run()?;
            println!("─────────────────────────────────");
            println!("  Courtside ETL: Database Stats");
            println!("─────────────────────────────────");
            println!("  Runs     : {}", utils::fmt_number(runs));
            println!("  Records  : {}", utils::fmt_number(records));
            for (source, n) in repo.records_by_source()? {
                println!("    {:<12} {}", source, utils::fmt_number(n));
            }
            match last {
                Some(run) => println!(
                    "  Last run : #{} {} ({}, {} records)",
                    run.id, run.started_at, run.status, run.records_written
                ),
                None => println!("  Last run : —"),
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Sources => {
            for s in &config.sources {
                println!("  {:<12} {:<18} {}", s.name, s.kind.label(), s.url);
                println!("  {:<12} → {}", "", config.pipeline.output_dir.join(&s.output).display());
            }
        }
    }

    Ok(())
}
