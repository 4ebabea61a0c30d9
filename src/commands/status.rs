use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::{self, DB_FILENAME};

pub fn run(args: StatusArgs) -> Result<()> {
    let cache_dir = args.cache_root.join("cache");
    let dump_dir = args.cache_root.join("dump");
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join(DB_FILENAME));

    info!(cache_root = %args.cache_root.display(), "status requested");

    for (label, dir) in [("cache", &cache_dir), ("dump", &dump_dir)] {
        if dir.exists() {
            info!(
                path = %dir.display(),
                json_files = count_json_files(dir)?,
                "{label} directory"
            );
        } else {
            warn!(path = %dir.display(), "{label} directory missing");
        }
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        store::ensure_schema(&conn)?;
        let run_count = query_count(&conn, "SELECT COUNT(*) FROM runs").unwrap_or(0);
        info!(path = %db_path.display(), runs = run_count, "database status");

        for summary in store::latest_runs(&conn, args.limit)? {
            info!(
                run_id = %summary.run_id,
                tgm = %summary.tgm_name,
                url = %summary.tgm_url,
                started_at = %summary.started_at,
                all = summary.all,
                critical = summary.critical,
                notice = summary.notice,
                "recorded run"
            );
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn count_json_files(dir: &Path) -> Result<usize> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        if entry.path().extension().and_then(|ext| ext.to_str()) == Some("json") {
            count += 1;
        }
    }
    Ok(count)
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
