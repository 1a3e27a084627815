//! The port between the dispatcher and the hardware/automation interface.
//!
//! An actuator receives each accepted intent together with its transition
//! handle. It must eventually report an outcome for that handle through
//! `Panel::resolve_transition` (or the HTTP API); the core never times out.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use super::CommandIntent;
use crate::mechanism::{Position, TransitionHandle};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("target unreachable: {0}")]
    Unreachable(String),
}

/// Driven side of the dispatcher. Must return promptly; any waiting on the
/// real hardware happens outside this call.
pub trait Actuator: Send + Sync {
    fn actuate(&self, intent: &CommandIntent, handle: TransitionHandle)
        -> Result<(), ActuatorError>;
}

/// Logs each request; outcomes are reported out of band by the automation
/// interface (e.g. over the HTTP API).
#[derive(Debug, Default)]
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn actuate(
        &self,
        intent: &CommandIntent,
        handle: TransitionHandle,
    ) -> Result<(), ActuatorError> {
        info!(
            attribute = %intent.attribute(),
            target = %intent.target(),
            %handle,
            issued_at = %intent.issued_at().to_rfc3339(),
            "actuation requested"
        );
        Ok(())
    }
}

/// Keeps every forwarded request. Optionally refuses a fixed set of targets.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    requests: Mutex<Vec<(CommandIntent, TransitionHandle)>>,
    refused: Vec<Position>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An actuator that reports the given targets as unreachable.
    pub fn refusing(refused: impl IntoIterator<Item = Position>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            refused: refused.into_iter().collect(),
        }
    }

    pub fn requests(&self) -> Vec<(CommandIntent, TransitionHandle)> {
        self.requests.lock().clone()
    }
}

impl Actuator for RecordingActuator {
    fn actuate(
        &self,
        intent: &CommandIntent,
        handle: TransitionHandle,
    ) -> Result<(), ActuatorError> {
        if self.refused.contains(&intent.target()) {
            return Err(ActuatorError::Unreachable(format!(
                "{} is not reachable on this stand",
                intent.target()
            )));
        }
        self.requests.lock().push((intent.clone(), handle));
        Ok(())
    }
}
