//! Mechanism attributes, their positions, and the state registry.
//!
//! Each monitored mechanism attribute has exactly two named positions
//! (open/closed, latched/unlatched, locked/unlocked). The registry tracks the
//! current state of every attribute and the transitions in flight.

pub mod registry;

use serde::{Deserialize, Serialize};

pub use self::registry::{
    MechanismRegistry, MechanismSnapshot, Outcome, PendingTransition, RegistryError,
    TransitionHandle,
};

/// One monitored mechanism property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismAttribute {
    OpenClosed,
    LatchedUnlatched,
    LockedUnlocked,
}

impl MechanismAttribute {
    /// Every attribute, in panel order.
    pub const ALL: [MechanismAttribute; 3] = [
        MechanismAttribute::OpenClosed,
        MechanismAttribute::LatchedUnlatched,
        MechanismAttribute::LockedUnlocked,
    ];

    /// The two positions this attribute can settle in.
    pub fn positions(self) -> [Position; 2] {
        match self {
            MechanismAttribute::OpenClosed => [Position::Open, Position::Closed],
            MechanismAttribute::LatchedUnlatched => [Position::Latched, Position::Unlatched],
            MechanismAttribute::LockedUnlocked => [Position::Locked, Position::Unlocked],
        }
    }
}

impl std::fmt::Display for MechanismAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MechanismAttribute::OpenClosed => write!(f, "open_closed"),
            MechanismAttribute::LatchedUnlatched => write!(f, "latched_unlatched"),
            MechanismAttribute::LockedUnlocked => write!(f, "locked_unlocked"),
        }
    }
}

impl std::str::FromStr for MechanismAttribute {
    type Err = ParseMechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_closed" => Ok(MechanismAttribute::OpenClosed),
            "latched_unlatched" => Ok(MechanismAttribute::LatchedUnlatched),
            "locked_unlocked" => Ok(MechanismAttribute::LockedUnlocked),
            other => Err(ParseMechanismError(other.to_string())),
        }
    }
}

/// A settled position of some attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Open,
    Closed,
    Latched,
    Unlatched,
    Locked,
    Unlocked,
}

impl Position {
    /// The attribute this position belongs to.
    pub fn attribute(self) -> MechanismAttribute {
        match self {
            Position::Open | Position::Closed => MechanismAttribute::OpenClosed,
            Position::Latched | Position::Unlatched => MechanismAttribute::LatchedUnlatched,
            Position::Locked | Position::Unlocked => MechanismAttribute::LockedUnlocked,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Position::Open => "open",
            Position::Closed => "closed",
            Position::Latched => "latched",
            Position::Unlatched => "unlatched",
            Position::Locked => "locked",
            Position::Unlocked => "unlocked",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Position {
    type Err = ParseMechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Position::Open),
            "closed" => Ok(Position::Closed),
            "latched" => Ok(Position::Latched),
            "unlatched" => Ok(Position::Unlatched),
            "locked" => Ok(Position::Locked),
            "unlocked" => Ok(Position::Unlocked),
            other => Err(ParseMechanismError(other.to_string())),
        }
    }
}

/// Current state of one attribute.
///
/// Only one position can ever hold at a time; an attribute with a command in
/// flight reports `Transitioning` until the outcome is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "position", rename_all = "snake_case")]
pub enum MechanismState {
    #[default]
    Unknown,
    Transitioning(Position),
    At(Position),
}

impl MechanismState {
    pub fn is_transitioning(self) -> bool {
        matches!(self, MechanismState::Transitioning(_))
    }
}

impl std::fmt::Display for MechanismState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MechanismState::Unknown => write!(f, "unknown"),
            MechanismState::Transitioning(target) => write!(f, "transitioning to {}", target),
            MechanismState::At(p) => write!(f, "{}", p),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised mechanism name '{0}'")]
pub struct ParseMechanismError(pub String);
