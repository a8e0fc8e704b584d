use crate::models::DatasetResult;
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, params};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS scrape_run_ids START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('scrape_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    sources_attempted   INTEGER DEFAULT 0,
    records_written     INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS records (
    run_id      INTEGER   NOT NULL,
    source      VARCHAR   NOT NULL,
    seq         INTEGER   NOT NULL,
    -- one exported record, JSON text
    payload     VARCHAR   NOT NULL,
    scraped_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (run_id, source, seq)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_source ON records (source);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub status: String,
    pub records_written: i64,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Records ───────────────────────────────────────────────────────────────

    /// Store every record of `dataset` under `run_id`, keeping its position.
    pub fn insert_records(&self, run_id: i64, dataset: &DatasetResult) -> Result<usize> {
        if dataset.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let tx = self.conn.unchecked_transaction()?;
        for (seq, record) in dataset.records.iter().enumerate() {
            let payload = serde_json::to_string(record)?;
            tx.execute(
                "INSERT INTO records (run_id, source, seq, payload, scraped_at) VALUES (?, ?, ?, ?, ?)",
                params![run_id, dataset.source, seq as i64, payload, now],
            )
            .with_context(|| format!("insert record {} #{}", dataset.source, seq))?;
        }
        tx.commit()?;
        Ok(dataset.len())
    }

    pub fn record_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM records")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    /// Record count per source over all runs.
    pub fn records_by_source(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, COUNT(*) FROM records GROUP BY source ORDER BY source")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self, sources: usize) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status, sources_attempted) VALUES (?, 'running', ?) RETURNING id",
            params![Utc::now().naive_utc(), sources as i64],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(&self, run_id: i64, records: usize, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               records_written = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                records as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn run_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM scrape_runs")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn last_run(&self) -> Result<Option<RunSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, status, records_written FROM scrape_runs ORDER BY id DESC LIMIT 1",
        )?;
        let run = stmt
            .query_row([], |r| {
                Ok(RunSummary {
                    id: r.get(0)?,
                    started_at: r.get(1)?,
                    status: r.get(2)?,
                    records_written: r.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            })
            .ok();
        Ok(run)
    }
}
