//! TOML configuration for a functional-test panel.
//!
//! Everything the stock panel hardcoded (rows, history seed, initial
//! mechanism positions) is supplied here instead, with defaults matching the
//! stock panel where one exists.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::history::{TestHistoryLog, TestRunRecord};
use crate::mechanism::{MechanismAttribute, MechanismRegistry, Position};
use crate::panel::display::DisplayConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FUNCTEST_CONFIG";

/// System-wide config location, tried after [`CONFIG_ENV`].
pub const SYSTEM_CONFIG_PATH: &str = "/etc/functest/functest.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub mechanisms: MechanismsConfig,
    /// Seed history, oldest first. Ignored when storage already holds runs.
    #[serde(default)]
    pub history: Vec<TestRunRecord>,
}

impl PanelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded panel configuration");
        Ok(config)
    }

    /// Try, in order: `$FUNCTEST_CONFIG`, [`SYSTEM_CONFIG_PATH`], defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "FUNCTEST_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Explicit path if given, otherwise the search in
    /// [`load_or_default`](Self::load_or_default).
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::load_or_default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.mechanisms.validate()?;
        if self.display.history_rows == 0 {
            anyhow::bail!("display.history_rows must be at least 1");
        }
        // Rejects more than one in-progress seed run.
        self.seed_log()?;
        Ok(())
    }

    pub fn initial_registry(&self) -> MechanismRegistry {
        MechanismRegistry::with_positions(self.mechanisms.positions())
    }

    pub fn seed_log(&self) -> Result<TestHistoryLog> {
        TestHistoryLog::from_records(self.history.iter().cloned())
            .context("seed history has more than one run in progress")
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding the test history. History is memory-only when unset.
    pub db_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Mechanisms
// ---------------------------------------------------------------------------

/// Initial confirmed position per attribute. Unset attributes start unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanismsConfig {
    pub open_closed: Option<Position>,
    pub latched_unlatched: Option<Position>,
    pub locked_unlocked: Option<Position>,
}

impl MechanismsConfig {
    fn entries(&self) -> [(MechanismAttribute, Option<Position>); 3] {
        [
            (MechanismAttribute::OpenClosed, self.open_closed),
            (MechanismAttribute::LatchedUnlatched, self.latched_unlatched),
            (MechanismAttribute::LockedUnlocked, self.locked_unlocked),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (attribute, position) in self.entries() {
            if let Some(p) = position {
                if p.attribute() != attribute {
                    anyhow::bail!("mechanisms.{} cannot be '{}'", attribute, p);
                }
            }
        }
        Ok(())
    }

    pub fn positions(&self) -> Vec<Position> {
        self.entries().into_iter().filter_map(|(_, p)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RunStatus;
    use crate::mechanism::MechanismState;
    use std::io::Write;

    const SAMPLE: &str = r#"
[api]
bind = "0.0.0.0:9000"

[mechanisms]
open_closed = "closed"
locked_unlocked = "locked"

[display]
title = "Door Rig"
history_rows = 3

[[history]]
start_time = "2024-12-04T09:20:00Z"
elapsed_secs = 936.0
status = "complete"
test_name = "MCU1 I/O Range"

[[history]]
start_time = "2024-12-12T14:21:00Z"
elapsed_secs = 1800.0
status = "in_progress"
test_name = "MCU1 Burn-in"
"#;

    #[test]
    fn test_defaults() {
        let cfg = PanelConfig::default();
        assert_eq!(cfg.api.bind, "127.0.0.1:8080");
        assert!(cfg.storage.db_path.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.display.title, "Functional Test GUI");
        assert!(cfg.history.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_parse_sample() {
        let cfg: PanelConfig = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.api.bind, "0.0.0.0:9000");
        assert_eq!(cfg.display.title, "Door Rig");
        // Unspecified display fields keep their defaults.
        assert_eq!(cfg.display.rows.len(), 6);

        let reg = cfg.initial_registry();
        assert_eq!(reg.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Closed));
        assert_eq!(reg.get(MechanismAttribute::LatchedUnlatched), MechanismState::Unknown);

        let log = cfg.seed_log().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.current().is_some());
        assert_eq!(log.list_runs()[0].status, RunStatus::Complete);
    }

    #[test]
    fn test_misplaced_position_rejected() {
        let cfg: PanelConfig = toml::from_str("[mechanisms]\nopen_closed = \"locked\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = PanelConfig::load(file.path()).unwrap();
        assert_eq!(cfg.history.len(), 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(PanelConfig::load(Path::new("/nonexistent/functest.toml")).is_err());
    }
}
