use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::engine::Bucket;
use crate::model::{EvaluationRecord, EvaluationRunManifest};
use crate::util::ensure_directory;

pub const DB_FILENAME: &str = "tgm_eval.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub tgm_name: String,
    pub tgm_url: String,
    pub started_at: String,
    pub all: i64,
    pub critical: i64,
    pub notice: i64,
}

pub fn open_run_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let connection =
        Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
              run_id TEXT PRIMARY KEY,
              tgm_name TEXT NOT NULL,
              tgm_url TEXT NOT NULL,
              language TEXT NOT NULL,
              started_at TEXT NOT NULL,
              finished_at TEXT NOT NULL,
              dataset_count INTEGER NOT NULL,
              all_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS run_counters (
              run_id TEXT NOT NULL,
              bucket TEXT NOT NULL,
              name TEXT NOT NULL,
              count INTEGER NOT NULL,
              PRIMARY KEY (run_id, bucket, name),
              FOREIGN KEY(run_id) REFERENCES runs(run_id)
            );

            CREATE TABLE IF NOT EXISTS run_records (
              run_id TEXT NOT NULL,
              seq INTEGER NOT NULL,
              source TEXT NOT NULL,
              question TEXT NOT NULL,
              label TEXT NOT NULL,
              bucket TEXT NOT NULL,
              PRIMARY KEY (run_id, seq),
              FOREIGN KEY(run_id) REFERENCES runs(run_id)
            );

            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            ",
        )
        .context("failed to ensure run database schema")
}

pub fn record_run(
    connection: &mut Connection,
    manifest: &EvaluationRunManifest,
    records: &[EvaluationRecord],
) -> Result<()> {
    let tx = connection
        .transaction()
        .context("failed to start run transaction")?;

    tx.execute(
        "INSERT OR REPLACE INTO runs
           (run_id, tgm_name, tgm_url, language, started_at, finished_at, dataset_count, all_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            manifest.run_id,
            manifest.tgm_name,
            manifest.tgm_url,
            manifest.language,
            manifest.started_at,
            manifest.finished_at,
            manifest.datasets.len() as i64,
            manifest.tally.all as i64,
        ],
    )
    .with_context(|| format!("failed to insert run {}", manifest.run_id))?;

    {
        let mut insert_counter = tx.prepare(
            "INSERT OR REPLACE INTO run_counters (run_id, bucket, name, count)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for bucket in Bucket::ALL {
            for (name, count) in manifest.tally.bucket(bucket) {
                insert_counter.execute(params![
                    manifest.run_id,
                    bucket.as_str(),
                    name,
                    *count as i64
                ])?;
            }
        }

        let mut insert_record = tx.prepare(
            "INSERT OR REPLACE INTO run_records (run_id, seq, source, question, label, bucket)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (seq, record) in records.iter().enumerate() {
            let Some(verdict) = &record.eval else {
                continue;
            };
            insert_record.execute(params![
                manifest.run_id,
                seq as i64,
                record.origin.source,
                record.origin.question,
                verdict.label,
                verdict.bucket.as_str(),
            ])?;
        }
    }

    tx.commit().context("failed to commit run transaction")?;
    Ok(())
}

pub fn latest_runs(connection: &Connection, limit: usize) -> Result<Vec<RunSummary>> {
    let mut statement = connection.prepare(
        "SELECT r.run_id, r.tgm_name, r.tgm_url, r.started_at, r.all_count,
                COALESCE((SELECT SUM(c.count) FROM run_counters c
                          WHERE c.run_id = r.run_id AND c.bucket = 'critical'), 0),
                COALESCE((SELECT SUM(c.count) FROM run_counters c
                          WHERE c.run_id = r.run_id AND c.bucket = 'notice'), 0)
         FROM runs r
         ORDER BY r.started_at DESC, r.run_id DESC
         LIMIT ?1",
    )?;

    let rows = statement.query_map(params![limit as i64], |row| {
        Ok(RunSummary {
            run_id: row.get(0)?,
            tgm_name: row.get(1)?,
            tgm_url: row.get(2)?,
            started_at: row.get(3)?,
            all: row.get(4)?,
            critical: row.get(5)?,
            notice: row.get(6)?,
        })
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        summaries.push(row?);
    }
    Ok(summaries)
}
