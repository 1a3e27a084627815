//! Display model for a panel front end.
//!
//! Nothing here renders. These are the default presentation constants (window
//! title, canvas, navigation, status/command rows, history table) plus the
//! pure mappings a front end needs: mechanism state to indicator, and history
//! records to table rows.

use serde::{Deserialize, Serialize};

use crate::dispatch::Command;
use crate::history::TestRunRecord;
use crate::mechanism::{MechanismSnapshot, MechanismState, Position};

/// Presentation configuration. Every field has the stock panel's value as its
/// default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Header navigation labels, left to right.
    pub navigation: Vec<String>,
    pub history_columns: Vec<String>,
    /// Rows visible in the history table.
    pub history_rows: usize,
    pub rows: Vec<RowConfig>,
    pub palette: Palette,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "Functional Test GUI".to_string(),
            width: 1200,
            height: 700,
            navigation: [
                "ARINC View",
                "Signal Plotter",
                "Functional Test",
                "Acceptance Tests",
                "Power Supplies",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            rows: vec![
                RowConfig::new(Position::Open, "Fully Opened Status", "Open Command"),
                RowConfig::new(Position::Closed, "Closed Status", "Close Command"),
                RowConfig::new(Position::Latched, "Latched Status", "Latch Command"),
                RowConfig::new(Position::Unlatched, "Unlatched Status", "Unlatch Command"),
                RowConfig::new(Position::Locked, "Locked Status", "Lock Command"),
                RowConfig::new(Position::Unlocked, "Unlocked Status", "Unlock Command"),
            ],
            history_columns: ["Start Time", "Elapsed Time", "Status", "Test Name"]
                .into_iter()
                .map(String::from)
                .collect(),
            history_rows: 5,
            palette: Palette::default(),
        }
    }
}

/// One status indicator paired with its command button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowConfig {
    pub position: Position,
    pub status_label: String,
    pub command_label: String,
}

impl RowConfig {
    pub fn new(position: Position, status_label: &str, command_label: &str) -> Self {
        Self {
            position,
            status_label: status_label.to_string(),
            command_label: command_label.to_string(),
        }
    }
}

/// Indicator colors, as CSS-style color strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub active: String,
    pub inactive: String,
    pub pending: String,
    pub unknown: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            active: "cyan".to_string(),
            inactive: "#3D3D3D".to_string(),
            pending: "#FFBF00".to_string(),
            unknown: "gray".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorLevel {
    /// The mechanism is confirmed in this row's position.
    Active,
    /// Confirmed in the other position, or moving away from this one.
    Inactive,
    /// A command towards this row's position is in flight.
    Pending,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub symbol: char,
    pub level: IndicatorLevel,
    pub color: String,
}

/// Indicator for the row showing `position`, given its attribute's state.
pub fn indicator(position: Position, state: MechanismState, palette: &Palette) -> Indicator {
    let level = match state {
        MechanismState::Unknown => IndicatorLevel::Unknown,
        MechanismState::At(p) if p == position => IndicatorLevel::Active,
        MechanismState::At(_) => IndicatorLevel::Inactive,
        MechanismState::Transitioning(target) if target == position => IndicatorLevel::Pending,
        MechanismState::Transitioning(_) => IndicatorLevel::Inactive,
    };
    let color = match level {
        IndicatorLevel::Active => &palette.active,
        IndicatorLevel::Inactive => &palette.inactive,
        IndicatorLevel::Pending => &palette.pending,
        IndicatorLevel::Unknown => &palette.unknown,
    };
    Indicator {
        symbol: '●',
        level,
        color: color.clone(),
    }
}

/// A fully resolved status/command row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub status_label: String,
    pub indicator: Indicator,
    pub command_label: String,
    pub command: Command,
}

pub fn status_rows(config: &DisplayConfig, mechanisms: &MechanismSnapshot) -> Vec<StatusRow> {
    config
        .rows
        .iter()
        .map(|row| StatusRow {
            status_label: row.status_label.clone(),
            indicator: indicator(
                row.position,
                mechanisms.get(row.position.attribute()),
                &config.palette,
            ),
            command_label: row.command_label.clone(),
            command: Command::from(row.position),
        })
        .collect()
}

/// One formatted history table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    pub start_time: String,
    pub elapsed: String,
    pub status: String,
    pub test_name: String,
}

impl From<&TestRunRecord> for HistoryRow {
    fn from(record: &TestRunRecord) -> Self {
        Self {
            start_time: record.start_time.format("%d %b - %H:%M").to_string(),
            elapsed: format!("{:.2} hr", record.elapsed.as_secs_f64() / 3600.0),
            status: record.status.to_string(),
            test_name: record.test_name.clone(),
        }
    }
}

/// Newest-first table rows, at most `limit` of them.
pub fn history_rows(records: &[TestRunRecord], limit: usize) -> Vec<HistoryRow> {
    records.iter().rev().take(limit).map(HistoryRow::from).collect()
}
