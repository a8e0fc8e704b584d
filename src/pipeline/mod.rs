//! Pipeline orchestrator: sources → exports → storage.
//!
//! Every source runs in its own task with its own browser session, at most
//! `pipeline.concurrency` at a time. A source that errors, panics or ends up
//! with zero records is reported as failed; the others still run and export.

pub mod accumulator;
pub mod sources;

use crate::config::{AppConfig, SourceConfig};
use crate::driver::{PageDriver, WebDriverClient};
use crate::export;
use crate::storage::Repository;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use self::sources::run_source;

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, sources: Vec<SourceConfig>) -> Result<PipelineStats> {
        let repo = if self.config.storage.enabled {
            let repo = Repository::open(&self.config.storage.db_path)
                .context("Failed to open DuckDB")?;
            if self.config.storage.run_migrations {
                repo.run_migrations()?;
            }
            Some(repo)
        } else {
            None
        };
        let run_id = match &repo {
            Some(repo) => repo.begin_scrape_run(sources.len()).ok(),
            None => None,
        };

        info!("=== Scraping {} sources ===", sources.len());

        let sem = Arc::new(Semaphore::new(self.config.pipeline.concurrency.max(1)));
        let mut handles = Vec::new();

        for source in sources {
            let sem = Arc::clone(&sem);
            let driver_cfg = self.config.driver.clone();
            let settings = self.config.extraction.clone();
            let name = source.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;

                let mut driver = WebDriverClient::connect(&driver_cfg)
                    .await
                    .with_context(|| format!("WebDriver session for {}", source.name))?;
                let report = run_source(&mut driver, &source, &settings).await;
                if let Err(e) = driver.close().await {
                    warn!("{}: closing session: {}", source.name, e);
                }

                Ok::<_, anyhow::Error>((source, report))
            });

            handles.push((name, handle));
        }

        let mut stats = PipelineStats::default();

        for (name, handle) in handles {
            stats.sources_attempted += 1;
            let (source, report) = match handle.await {
                Ok(Ok(done)) => done,
                Ok(Err(e)) => {
                    warn!("{}: {:#}", name, e);
                    stats.failed.push(name);
                    continue;
                }
                Err(e) => {
                    error!("Task panic for {}: {}", name, e);
                    stats.failed.push(name);
                    continue;
                }
            };

            stats.units_skipped += report.failures.len();
            if let Some(consent) = report.consent {
                debug!("{}: consent banner {:?}", name, consent);
            }
            if report.is_partial() {
                stats.partial.push(name.clone());
            }
            if report.is_failed() {
                warn!(
                    "{}: no records after {} skipped units, nothing exported",
                    name,
                    report.failures.len()
                );
                stats.failed.push(name);
                continue;
            }

            match export::export(
                &report.dataset,
                &self.config.pipeline.output_dir,
                &source.output,
                self.config.pipeline.format,
            ) {
                Ok(_) => stats.records_exported += report.dataset.len(),
                Err(e) => {
                    warn!("{}: export failed: {:#}", name, e);
                    stats.failed.push(name.clone());
                }
            }

            if let (Some(repo), Some(run_id)) = (&repo, run_id) {
                if let Err(e) = repo.insert_records(run_id, &report.dataset) {
                    warn!("{}: storing records failed: {:#}", name, e);
                }
            }
        }

        if let (Some(repo), Some(run_id)) = (&repo, run_id) {
            let failure = (!stats.failed.is_empty())
                .then(|| format!("failed sources: {}", stats.failed.join(", ")));
            repo.finish_scrape_run(run_id, stats.records_exported, failure.as_deref())
                .ok();
        }

        if !stats.partial.is_empty() {
            warn!("Default page of rows only: {}", stats.partial.join(", "));
        }
        info!(
            "=== Done: {} sources | {} records | {} skipped units | {} failed ===",
            stats.sources_attempted,
            stats.records_exported,
            stats.units_skipped,
            stats.failed.len()
        );

        Ok(stats)
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub sources_attempted: usize,
    pub records_exported: usize,
    pub units_skipped: usize,
    /// Sources whose page-size control could not be switched to all rows.
    pub partial: Vec<String>,
    pub failed: Vec<String>,
}
