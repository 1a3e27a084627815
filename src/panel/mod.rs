//! The panel context: one registry/dispatcher and one test history log,
//! shared between the presentation layer and the automation interface.
//!
//! A `Panel` is an explicitly owned value; clone it to share. Several panels
//! can live in one process without interfering.
//!
//! Lock order is always commands, then log.

pub mod display;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::dispatch::{Actuator, Command, DispatchError, Dispatcher};
use crate::history::{LogError, RunEntry, RunHandle, RunStatus, TestHistoryLog, TestRunRecord};
use crate::mechanism::{
    MechanismAttribute, MechanismRegistry, MechanismSnapshot, MechanismState, Outcome,
    PendingTransition, Position, TransitionHandle,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanelError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// What resolving a transition changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub state: MechanismState,
    /// Run finished because this transition triggered it.
    pub finished_run: Option<RunHandle>,
}

/// Consistent view of the whole panel.
#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub mechanisms: MechanismSnapshot,
    pub pending: Vec<PendingTransition>,
    pub runs: Vec<RunEntry>,
    pub current_run: Option<RunHandle>,
}

struct Commands {
    dispatcher: Dispatcher,
    /// Transitions that triggered a run, and the run they own.
    correlated: HashMap<TransitionHandle, RunHandle>,
}

struct PanelInner {
    commands: Mutex<Commands>,
    log: RwLock<TestHistoryLog>,
}

#[derive(Clone)]
pub struct Panel {
    inner: Arc<PanelInner>,
}

impl Panel {
    pub fn new(registry: MechanismRegistry, actuator: Arc<dyn Actuator>, log: TestHistoryLog) -> Self {
        Self {
            inner: Arc::new(PanelInner {
                commands: Mutex::new(Commands {
                    dispatcher: Dispatcher::new(registry, actuator),
                    correlated: HashMap::new(),
                }),
                log: RwLock::new(log),
            }),
        }
    }

    // -- mechanisms ---------------------------------------------------------

    pub fn get(&self, attribute: MechanismAttribute) -> MechanismState {
        self.inner.commands.lock().dispatcher.get(attribute)
    }

    pub fn mechanisms(&self) -> MechanismSnapshot {
        self.inner.commands.lock().dispatcher.registry().snapshot()
    }

    pub fn pending(&self) -> Vec<PendingTransition> {
        self.inner.commands.lock().dispatcher.registry().pending()
    }

    /// Manual command. Creates no history entry.
    pub fn issue(
        &self,
        attribute: MechanismAttribute,
        target: Position,
    ) -> Result<TransitionHandle, PanelError> {
        Ok(self.inner.commands.lock().dispatcher.issue(attribute, target)?)
    }

    pub fn issue_command(&self, command: Command) -> Result<TransitionHandle, PanelError> {
        self.issue(command.attribute(), command.target())
    }

    /// Issue a command that is itself the trigger of a test run.
    ///
    /// Either both the run and the transition start, or neither does. When the
    /// transition resolves, the run finishes `Complete` on success and `Failed`
    /// on failure, unless its owner finished it first.
    pub fn issue_run_command(
        &self,
        test_name: impl Into<String>,
        start_time: DateTime<Utc>,
        command: Command,
    ) -> Result<(TransitionHandle, RunHandle), PanelError> {
        let mut commands = self.inner.commands.lock();
        let mut log = self.inner.log.write();

        if let Some(active) = log.current() {
            return Err(LogError::RunAlreadyInProgress(active).into());
        }
        let transition = commands.dispatcher.issue_command(command)?;
        let run = log.start_run(test_name, start_time)?;
        commands.correlated.insert(transition, run);

        info!(%command, %transition, %run, "command started test run");
        Ok((transition, run))
    }

    pub fn resolve_transition(
        &self,
        handle: TransitionHandle,
        outcome: Outcome,
    ) -> Result<Resolution, PanelError> {
        let mut commands = self.inner.commands.lock();
        let state = commands.dispatcher.resolve(handle, outcome)?;

        let Some(run) = commands.correlated.remove(&handle) else {
            return Ok(Resolution {
                state,
                finished_run: None,
            });
        };

        let status = match outcome {
            Outcome::Success => RunStatus::Complete,
            Outcome::Failure => RunStatus::Failed,
        };
        let mut log = self.inner.log.write();
        let finished_run = match log.finish_run(run, status) {
            Ok(()) => Some(run),
            Err(LogError::AlreadyTerminal(_)) => {
                debug!(%run, %handle, "triggered run already finished by its owner");
                None
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Resolution {
            state,
            finished_run,
        })
    }

    // -- history ------------------------------------------------------------

    pub fn start_run(
        &self,
        test_name: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Result<RunHandle, PanelError> {
        Ok(self.inner.log.write().start_run(test_name, start_time)?)
    }

    pub fn update_elapsed(&self, handle: RunHandle, elapsed: Duration) -> Result<(), PanelError> {
        Ok(self.inner.log.write().update_elapsed(handle, elapsed)?)
    }

    pub fn finish_run(&self, handle: RunHandle, status: RunStatus) -> Result<(), PanelError> {
        Ok(self.inner.log.write().finish_run(handle, status)?)
    }

    pub fn list_runs(&self) -> Vec<TestRunRecord> {
        self.inner.log.read().list_runs()
    }

    pub fn run_entries(&self) -> Vec<RunEntry> {
        self.inner.log.read().entries()
    }

    pub fn run(&self, handle: RunHandle) -> Option<RunEntry> {
        self.inner.log.read().get(handle).map(|record| RunEntry {
            handle,
            record: record.clone(),
        })
    }

    pub fn current_run(&self) -> Option<RunHandle> {
        self.inner.log.read().current()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let commands = self.inner.commands.lock();
        let log = self.inner.log.read();
        let registry = commands.dispatcher.registry();
        PanelSnapshot {
            mechanisms: registry.snapshot(),
            pending: registry.pending(),
            runs: log.entries(),
            current_run: log.current(),
        }
    }
}

impl std::fmt::Debug for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingActuator;

    fn panel() -> Panel {
        Panel::new(
            MechanismRegistry::with_positions([Position::Closed, Position::Latched, Position::Locked]),
            Arc::new(RecordingActuator::new()),
            TestHistoryLog::new(),
        )
    }

    #[test]
    fn test_manual_command_creates_no_run() {
        let p = panel();
        let h = p.issue_command(Command::Open).unwrap();
        p.resolve_transition(h, Outcome::Success).unwrap();
        assert!(p.list_runs().is_empty());
        assert_eq!(p.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Open));
    }

    #[test]
    fn test_run_command_finishes_run_on_resolution() {
        let p = panel();
        let (t, r) = p
            .issue_run_command("Functional Test", Utc::now(), Command::Unlock)
            .unwrap();
        assert_eq!(p.current_run(), Some(r));

        let res = p.resolve_transition(t, Outcome::Failure).unwrap();
        assert_eq!(res.state, MechanismState::At(Position::Locked));
        assert_eq!(res.finished_run, Some(r));
        assert_eq!(p.run(r).unwrap().record.status, RunStatus::Failed);
        assert_eq!(p.current_run(), None);
    }

    #[test]
    fn test_run_command_refused_while_run_active() {
        let p = panel();
        p.start_run("MCU1 Burn-in", Utc::now()).unwrap();
        let err = p
            .issue_run_command("Functional Test", Utc::now(), Command::Open)
            .unwrap_err();
        assert!(matches!(err, PanelError::Log(LogError::RunAlreadyInProgress(_))));
        // No transition was started.
        assert!(p.pending().is_empty());
        assert_eq!(p.list_runs().len(), 1);
    }

    #[test]
    fn test_run_command_with_invalid_transition_starts_no_run() {
        let p = panel();
        let err = p
            .issue_run_command("Functional Test", Utc::now(), Command::Close)
            .unwrap_err();
        assert!(matches!(err, PanelError::Dispatch(_)));
        assert!(p.list_runs().is_empty());
        assert_eq!(p.current_run(), None);
    }

    #[test]
    fn test_owner_may_finish_triggered_run_first() {
        let p = panel();
        let (t, r) = p
            .issue_run_command("Functional Test", Utc::now(), Command::Open)
            .unwrap();
        p.finish_run(r, RunStatus::Interrupted).unwrap();

        let res = p.resolve_transition(t, Outcome::Success).unwrap();
        assert_eq!(res.finished_run, None);
        assert_eq!(p.run(r).unwrap().record.status, RunStatus::Interrupted);
    }

    #[test]
    fn test_panels_are_independent() {
        let a = panel();
        let b = panel();
        a.issue_command(Command::Open).unwrap();
        assert_eq!(b.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Closed));
        assert!(b.issue_command(Command::Open).is_ok());
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let p = panel();
        let h = p.issue_command(Command::Unlatch).unwrap();
        let snap = p.snapshot();
        assert_eq!(snap.pending.len(), 1);
        assert_eq!(snap.pending[0].handle, h);
        assert_eq!(
            snap.mechanisms.get(MechanismAttribute::LatchedUnlatched),
            MechanismState::Transitioning(Position::Unlatched)
        );
    }
}
