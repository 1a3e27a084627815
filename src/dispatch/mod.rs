//! Command dispatch -- turns panel commands into registry transitions and
//! forwards them to the hardware/automation interface.

pub mod actuator;
pub mod dispatcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mechanism::{MechanismAttribute, Position, RegistryError};

pub use self::actuator::{Actuator, ActuatorError, LoggingActuator, RecordingActuator};
pub use self::dispatcher::Dispatcher;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The dispatcher already holds an unresolved command for this attribute.
    #[error("{0} is busy with an unresolved command")]
    Busy(MechanismAttribute),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("actuator rejected command for {attribute}: {source}")]
    Rejected {
        attribute: MechanismAttribute,
        #[source]
        source: ActuatorError,
    },
}

/// The six commands a panel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Open,
    Close,
    Latch,
    Unlatch,
    Lock,
    Unlock,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Open,
        Command::Close,
        Command::Latch,
        Command::Unlatch,
        Command::Lock,
        Command::Unlock,
    ];

    /// Position this command drives its attribute to.
    pub fn target(self) -> Position {
        match self {
            Command::Open => Position::Open,
            Command::Close => Position::Closed,
            Command::Latch => Position::Latched,
            Command::Unlatch => Position::Unlatched,
            Command::Lock => Position::Locked,
            Command::Unlock => Position::Unlocked,
        }
    }

    pub fn attribute(self) -> MechanismAttribute {
        self.target().attribute()
    }
}

impl From<Position> for Command {
    fn from(position: Position) -> Self {
        match position {
            Position::Open => Command::Open,
            Position::Closed => Command::Close,
            Position::Latched => Command::Latch,
            Position::Unlatched => Command::Unlatch,
            Position::Locked => Command::Lock,
            Position::Unlocked => Command::Unlock,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Command::Open => "open",
            Command::Close => "close",
            Command::Latch => "latch",
            Command::Unlatch => "unlatch",
            Command::Lock => "lock",
            Command::Unlock => "unlock",
        };
        f.write_str(s)
    }
}

/// A requested actuation. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandIntent {
    attribute: MechanismAttribute,
    target: Position,
    issued_at: DateTime<Utc>,
}

impl CommandIntent {
    pub fn new(attribute: MechanismAttribute, target: Position) -> Self {
        Self {
            attribute,
            target,
            issued_at: Utc::now(),
        }
    }

    pub fn attribute(&self) -> MechanismAttribute {
        self.attribute
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_cover_every_position_once() {
        let targets: Vec<_> = Command::ALL.iter().map(|c| c.target()).collect();
        for attribute in MechanismAttribute::ALL {
            for position in attribute.positions() {
                assert_eq!(targets.iter().filter(|&&t| t == position).count(), 1);
                assert_eq!(Command::from(position).target(), position);
            }
        }
    }

    #[test]
    fn test_close_drives_open_closed() {
        assert_eq!(Command::Close.attribute(), MechanismAttribute::OpenClosed);
        assert_eq!(Command::Close.target(), Position::Closed);
    }
}
