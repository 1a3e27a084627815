//! Append-only, insertion-ordered history of test runs.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{LogError, RunEntry, RunHandle, RunStatus, TestRunRecord};

#[derive(Debug, Clone, Default)]
pub struct TestHistoryLog {
    entries: Vec<RunEntry>,
    index: HashMap<RunHandle, usize>,
    active: Option<RunHandle>,
}

impl TestHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a log from existing records, oldest first. Each record gets a
    /// fresh handle.
    pub fn from_records(records: impl IntoIterator<Item = TestRunRecord>) -> Result<Self, LogError> {
        Self::from_entries(records.into_iter().map(|record| RunEntry {
            handle: RunHandle::new(),
            record,
        }))
    }

    /// Seed a log from entries that already carry handles (e.g. from storage).
    pub fn from_entries(entries: impl IntoIterator<Item = RunEntry>) -> Result<Self, LogError> {
        let mut log = Self::new();
        for entry in entries {
            if entry.record.status == RunStatus::InProgress {
                if let Some(active) = log.active {
                    return Err(LogError::RunAlreadyInProgress(active));
                }
                log.active = Some(entry.handle);
            }
            log.index.insert(entry.handle, log.entries.len());
            log.entries.push(entry);
        }
        Ok(log)
    }

    /// Begin a new run. Refused while another run is in progress.
    pub fn start_run(
        &mut self,
        test_name: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Result<RunHandle, LogError> {
        if let Some(active) = self.active {
            return Err(LogError::RunAlreadyInProgress(active));
        }

        let record = TestRunRecord::started(test_name, start_time);
        let handle = RunHandle::new();
        info!(run = %handle, test = %record.test_name, start = %start_time.to_rfc3339(), "test run started");

        self.index.insert(handle, self.entries.len());
        self.entries.push(RunEntry { handle, record });
        self.active = Some(handle);
        Ok(handle)
    }

    pub fn update_elapsed(&mut self, handle: RunHandle, elapsed: Duration) -> Result<(), LogError> {
        let entry = self.entry_mut(handle)?;
        if entry.record.status.is_terminal() {
            return Err(LogError::NotInProgress(handle));
        }
        entry.record.elapsed = elapsed;
        Ok(())
    }

    /// Move a run to its terminal status. Calling this twice is an error.
    pub fn finish_run(&mut self, handle: RunHandle, status: RunStatus) -> Result<(), LogError> {
        if !status.is_terminal() {
            return Err(LogError::InvalidStatus(status));
        }
        let entry = self.entry_mut(handle)?;
        if entry.record.status.is_terminal() {
            return Err(LogError::AlreadyTerminal(handle));
        }
        entry.record.status = status;

        let record = &entry.record;
        match status {
            RunStatus::Complete => info!(
                run = %handle,
                test = %record.test_name,
                elapsed_secs = record.elapsed.as_secs_f64(),
                "test run complete"
            ),
            _ => warn!(
                run = %handle,
                test = %record.test_name,
                %status,
                elapsed_secs = record.elapsed.as_secs_f64(),
                "test run ended early"
            ),
        }

        if self.active == Some(handle) {
            self.active = None;
        }
        Ok(())
    }

    /// Snapshot of every record in insertion order.
    pub fn list_runs(&self) -> Vec<TestRunRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    /// Like [`list_runs`](Self::list_runs), with handles.
    pub fn entries(&self) -> Vec<RunEntry> {
        self.entries.clone()
    }

    pub fn get(&self, handle: RunHandle) -> Option<&TestRunRecord> {
        self.index.get(&handle).map(|&i| &self.entries[i].record)
    }

    /// The run currently in progress, if any.
    pub fn current(&self) -> Option<RunHandle> {
        self.active
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, handle: RunHandle) -> Result<&mut RunEntry, LogError> {
        let i = *self.index.get(&handle).ok_or(LogError::UnknownRun(handle))?;
        Ok(&mut self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 12, h, m, 0).unwrap()
    }

    #[test]
    fn test_single_run_in_flight() {
        let mut log = TestHistoryLog::new();
        let r = log.start_run("MCU1 Burn-in", t(14, 21)).unwrap();
        assert_eq!(
            log.start_run("Functional Test", t(14, 30)).unwrap_err(),
            LogError::RunAlreadyInProgress(r)
        );

        log.finish_run(r, RunStatus::Complete).unwrap();
        let r2 = log.start_run("Functional Test", t(14, 30)).unwrap();
        assert_eq!(log.current(), Some(r2));

        let names: Vec<_> = log.list_runs().into_iter().map(|r| r.test_name).collect();
        assert_eq!(names, ["MCU1 Burn-in", "Functional Test"]);
    }

    #[test]
    fn test_elapsed_only_while_in_progress() {
        let mut log = TestHistoryLog::new();
        let r = log.start_run("MCU1 PBIT Verify", t(10, 36)).unwrap();
        log.update_elapsed(r, Duration::from_secs(360)).unwrap();
        assert_eq!(log.get(r).unwrap().elapsed, Duration::from_secs(360));

        log.finish_run(r, RunStatus::Interrupted).unwrap();
        assert_eq!(
            log.update_elapsed(r, Duration::from_secs(400)).unwrap_err(),
            LogError::NotInProgress(r)
        );
        assert_eq!(log.get(r).unwrap().elapsed, Duration::from_secs(360));
    }

    #[test]
    fn test_finish_is_not_idempotent() {
        let mut log = TestHistoryLog::new();
        let r = log.start_run("Functional Test", t(13, 26)).unwrap();
        log.finish_run(r, RunStatus::Failed).unwrap();
        assert_eq!(log.finish_run(r, RunStatus::Failed).unwrap_err(), LogError::AlreadyTerminal(r));
        assert_eq!(
            log.finish_run(r, RunStatus::Complete).unwrap_err(),
            LogError::AlreadyTerminal(r)
        );
        assert_eq!(log.get(r).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn test_finish_requires_terminal_status() {
        let mut log = TestHistoryLog::new();
        let r = log.start_run("Functional Test", t(13, 26)).unwrap();
        assert_eq!(
            log.finish_run(r, RunStatus::InProgress).unwrap_err(),
            LogError::InvalidStatus(RunStatus::InProgress)
        );
        assert_eq!(log.current(), Some(r));
    }

    #[test]
    fn test_unknown_run() {
        let mut log = TestHistoryLog::new();
        let bogus = RunHandle::new();
        assert_eq!(log.finish_run(bogus, RunStatus::Complete).unwrap_err(), LogError::UnknownRun(bogus));
        assert_eq!(
            log.update_elapsed(bogus, Duration::ZERO).unwrap_err(),
            LogError::UnknownRun(bogus)
        );
    }

    #[test]
    fn test_seeding_rejects_two_in_progress() {
        let records = vec![
            TestRunRecord::started("MCU1 I/O Range", t(9, 20)),
            TestRunRecord::started("MCU1 Burn-in", t(14, 21)),
        ];
        assert!(matches!(
            TestHistoryLog::from_records(records),
            Err(LogError::RunAlreadyInProgress(_))
        ));
    }

    #[test]
    fn test_seeded_in_progress_run_blocks_and_can_finish() {
        let mut done = TestRunRecord::started("MCU1 I/O Range", t(9, 20));
        done.status = RunStatus::Complete;
        let mut log = TestHistoryLog::from_records(vec![
            done,
            TestRunRecord::started("MCU1 Burn-in", t(14, 21)),
        ])
        .unwrap();

        let active = log.current().unwrap();
        assert!(log.start_run("Functional Test", t(15, 0)).is_err());
        log.finish_run(active, RunStatus::Complete).unwrap();
        assert!(log.start_run("Functional Test", t(15, 0)).is_ok());
        assert_eq!(log.len(), 3);
    }
}
