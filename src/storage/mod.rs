//! SQLite storage layer -- test run history that survives restarts.

pub mod schema;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{info, warn};
use uuid::Uuid;

use crate::history::{RunEntry, RunHandle, RunStatus, TestHistoryLog, TestRunRecord};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Insert a run, or update it if its handle is already stored.
pub fn save_run(pool: &Pool, entry: &RunEntry) -> Result<()> {
    let conn = pool.get()?;
    let r = &entry.record;
    conn.execute(
        "INSERT INTO test_runs (id, test_name, status, start_time, elapsed_secs)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            elapsed_secs = excluded.elapsed_secs,
            updated_at = datetime('now')",
        params![
            entry.handle.id().to_string(),
            r.test_name,
            r.status.as_str(),
            r.start_time.to_rfc3339(),
            r.elapsed.as_secs_f64(),
        ],
    )
    .context("Failed to save test run")?;
    Ok(())
}

/// All stored runs in insertion order.
pub fn load_runs(pool: &Pool) -> Result<Vec<RunEntry>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, test_name, status, start_time, elapsed_secs FROM test_runs ORDER BY seq ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
        ))
    })?;

    let mut entries = Vec::new();
    for r in rows {
        let (id, test_name, status, start_time, elapsed_secs) = r?;
        let id = Uuid::parse_str(&id).with_context(|| format!("bad run id '{}'", id))?;
        let status: RunStatus = status.parse().map_err(anyhow::Error::msg)?;
        let start_time = DateTime::parse_from_rfc3339(&start_time)
            .with_context(|| format!("bad start time for run {}", id))?
            .with_timezone(&Utc);
        let elapsed = Duration::try_from_secs_f64(elapsed_secs)
            .with_context(|| format!("bad elapsed time for run {}", id))?;

        entries.push(RunEntry {
            handle: RunHandle::from(id),
            record: TestRunRecord {
                start_time,
                elapsed,
                status,
                test_name,
            },
        });
    }
    Ok(entries)
}

/// Mark runs left in progress by a previous process as interrupted.
/// Their owners did not survive the restart.
pub fn interrupt_orphaned_runs(pool: &Pool) -> Result<usize> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE test_runs SET status = ?1, updated_at = datetime('now') WHERE status = ?2",
        params![RunStatus::Interrupted.as_str(), RunStatus::InProgress.as_str()],
    )?;
    if changed > 0 {
        warn!(count = changed, "marked orphaned in-progress runs as interrupted");
    }
    Ok(changed)
}

/// Rebuild the history log from storage.
///
/// An empty store is filled from `seed` first, so a fresh database starts
/// with the configured history.
pub fn restore_log(pool: &Pool, seed: &TestHistoryLog) -> Result<TestHistoryLog> {
    interrupt_orphaned_runs(pool)?;
    let mut entries = load_runs(pool)?;

    if entries.is_empty() && !seed.is_empty() {
        for entry in seed.entries() {
            save_run(pool, &entry)?;
        }
        entries = seed.entries();
        info!(count = entries.len(), "seeded history store from configuration");
    }

    let log = TestHistoryLog::from_entries(entries)?;
    info!(runs = log.len(), "restored test history");
    Ok(log)
}

/// Read the history log as stored, without touching the rows.
///
/// For processes that inspect a store another process may own: in-progress
/// runs are reported as they are on disk.
pub fn read_log(pool: &Pool) -> Result<TestHistoryLog> {
    let log = TestHistoryLog::from_entries(load_runs(pool)?)?;
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_pool() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("history.db")).unwrap();
        (dir, pool)
    }

    #[test]
    fn test_save_and_load_preserves_order_and_updates() {
        let (_dir, pool) = temp_pool();
        let mut log = TestHistoryLog::new();
        let t0 = Utc.with_ymd_and_hms(2024, 12, 4, 9, 20, 0).unwrap();
        let first = log.start_run("MCU1 I/O Range", t0).unwrap();
        log.update_elapsed(first, Duration::from_secs(936)).unwrap();
        log.finish_run(first, RunStatus::Complete).unwrap();
        let second = log.start_run("MCU1 PBIT Verify", t0).unwrap();

        for e in log.entries() {
            save_run(&pool, &e).unwrap();
        }
        log.finish_run(second, RunStatus::Failed).unwrap();
        save_run(&pool, &log.entries()[1]).unwrap();

        let loaded = load_runs(&pool).unwrap();
        assert_eq!(loaded, log.entries());
        assert_eq!(loaded[0].record.elapsed, Duration::from_secs(936));
        assert_eq!(loaded[1].record.status, RunStatus::Failed);
    }

    #[test]
    fn test_restore_interrupts_orphans() {
        let (_dir, pool) = temp_pool();
        let mut log = TestHistoryLog::new();
        let run = log.start_run("MCU1 Burn-in", Utc::now()).unwrap();
        save_run(&pool, &log.entries()[0]).unwrap();

        let restored = restore_log(&pool, &TestHistoryLog::new()).unwrap();
        assert_eq!(restored.current(), None);
        assert_eq!(restored.get(run).unwrap().status, RunStatus::Interrupted);
    }

    #[test]
    fn test_restore_seeds_empty_store() {
        let (_dir, pool) = temp_pool();
        let seed = TestHistoryLog::from_records(vec![TestRunRecord::started(
            "Functional Test",
            Utc::now(),
        )])
        .unwrap();

        let restored = restore_log(&pool, &seed).unwrap();
        assert_eq!(restored.entries(), seed.entries());
        assert!(restored.current().is_some());
        assert_eq!(load_runs(&pool).unwrap().len(), 1);
    }

    #[test]
    fn test_read_log_leaves_in_progress_runs() {
        let (_dir, pool) = temp_pool();
        let mut log = TestHistoryLog::new();
        let run = log.start_run("MCU1 Burn-in", Utc::now()).unwrap();
        save_run(&pool, &log.entries()[0]).unwrap();

        let read = read_log(&pool).unwrap();
        assert_eq!(read.current(), Some(run));
        assert_eq!(load_runs(&pool).unwrap()[0].record.status, RunStatus::InProgress);
    }

    #[test]
    fn test_read_log_does_not_seed() {
        let (_dir, pool) = temp_pool();
        assert!(read_log(&pool).unwrap().is_empty());
        assert!(load_runs(&pool).unwrap().is_empty());
    }
}
