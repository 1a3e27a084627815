//! Test run history -- lifecycle of functional/acceptance test runs.
//!
//! A run moves `InProgress -> {Complete, Interrupted, Failed}` and is frozen
//! once terminal. The log admits at most one `InProgress` run at a time.

pub mod log;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use self::log::TestHistoryLog;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("run {0} is already in progress")]
    RunAlreadyInProgress(RunHandle),
    #[error("run {0} is not in progress")]
    NotInProgress(RunHandle),
    #[error("run {0} has already finished")]
    AlreadyTerminal(RunHandle),
    #[error("no run with handle {0}")]
    UnknownRun(RunHandle),
    #[error("{0} is not a terminal status")]
    InvalidStatus(RunStatus),
}

/// Opaque token owned by whoever started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(Uuid);

impl RunHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for RunHandle {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Complete,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    /// Stable lowercase name, used for storage.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Complete => "complete",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::InProgress => "In Progress",
            RunStatus::Complete => "Complete",
            RunStatus::Interrupted => "Interrupted",
            RunStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RunStatus::InProgress),
            "complete" => Ok(RunStatus::Complete),
            "interrupted" => Ok(RunStatus::Interrupted),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// One test run as shown in the history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunRecord {
    pub start_time: DateTime<Utc>,
    #[serde(rename = "elapsed_secs", with = "duration_secs")]
    pub elapsed: Duration,
    pub status: RunStatus,
    pub test_name: String,
}

impl TestRunRecord {
    pub fn started(test_name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            elapsed: Duration::ZERO,
            status: RunStatus::InProgress,
            test_name: test_name.into(),
        }
    }
}

/// A record together with the handle that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub handle: RunHandle,
    #[serde(flatten)]
    pub record: TestRunRecord,
}

/// Serializes a `Duration` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_in_progress_is_non_terminal() {
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(RunStatus::Complete.is_terminal());
        assert!(RunStatus::Interrupted.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_storage_names() {
        for status in [
            RunStatus::InProgress,
            RunStatus::Complete,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert_eq!(RunStatus::InProgress.to_string(), "In Progress");
    }

    #[test]
    fn test_record_json_uses_seconds() {
        let mut record = TestRunRecord::started("MCU1 I/O Range", Utc::now());
        record.elapsed = Duration::from_secs(936);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["elapsed_secs"], 936.0);
        assert_eq!(json["status"], "in_progress");

        let back: TestRunRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.elapsed, Duration::from_secs(936));
    }
}
