//! Single source of truth for the current state of each mechanism attribute.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{MechanismAttribute, MechanismState, Position};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid transition of {attribute} to {target}: {reason}")]
    InvalidTransition {
        attribute: MechanismAttribute,
        target: Position,
        reason: &'static str,
    },
    #[error("a transition of {0} is already in flight")]
    TransitionInProgress(MechanismAttribute),
    #[error("unknown or already resolved transition handle {0}")]
    UnknownHandle(TransitionHandle),
}

/// Opaque token correlating a transition request with its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionHandle(Uuid);

impl TransitionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TransitionHandle {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TransitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Reported result of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A transition that has begun but not been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransition {
    pub handle: TransitionHandle,
    pub attribute: MechanismAttribute,
    pub target: Position,
    /// State the attribute reverts to on failure.
    pub previous: MechanismState,
}

/// Point-in-time view of every attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MechanismSnapshot {
    pub states: BTreeMap<MechanismAttribute, MechanismState>,
}

impl MechanismSnapshot {
    pub fn get(&self, attribute: MechanismAttribute) -> MechanismState {
        self.states.get(&attribute).copied().unwrap_or_default()
    }
}

/// Holds the state of all three attributes and every in-flight transition.
#[derive(Debug, Clone, Default)]
pub struct MechanismRegistry {
    states: BTreeMap<MechanismAttribute, MechanismState>,
    pending: HashMap<TransitionHandle, PendingTransition>,
}

impl MechanismRegistry {
    /// Create a registry with every attribute `Unknown`.
    pub fn new() -> Self {
        Self::with_positions(std::iter::empty())
    }

    /// Create a registry from known initial positions.
    ///
    /// Attributes without an entry start `Unknown`. A later entry for the same
    /// attribute replaces an earlier one.
    pub fn with_positions(initial: impl IntoIterator<Item = Position>) -> Self {
        let mut states: BTreeMap<_, _> = MechanismAttribute::ALL
            .into_iter()
            .map(|a| (a, MechanismState::Unknown))
            .collect();
        for position in initial {
            states.insert(position.attribute(), MechanismState::At(position));
        }
        Self {
            states,
            pending: HashMap::new(),
        }
    }

    pub fn get(&self, attribute: MechanismAttribute) -> MechanismState {
        self.states.get(&attribute).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> MechanismSnapshot {
        MechanismSnapshot {
            states: self.states.clone(),
        }
    }

    /// In-flight transitions, ordered by attribute.
    pub fn pending(&self) -> Vec<PendingTransition> {
        let mut pending: Vec<_> = self.pending.values().cloned().collect();
        pending.sort_by_key(|p| p.attribute);
        pending
    }

    pub fn pending_for(&self, handle: TransitionHandle) -> Option<&PendingTransition> {
        self.pending.get(&handle)
    }

    /// Start moving `attribute` towards `target`.
    pub fn begin_transition(
        &mut self,
        attribute: MechanismAttribute,
        target: Position,
    ) -> Result<TransitionHandle, RegistryError> {
        if target.attribute() != attribute {
            return Err(RegistryError::InvalidTransition {
                attribute,
                target,
                reason: "target position belongs to another attribute",
            });
        }

        let current = self.get(attribute);
        match current {
            MechanismState::Transitioning(_) => {
                return Err(RegistryError::TransitionInProgress(attribute));
            }
            MechanismState::At(p) if p == target => {
                return Err(RegistryError::InvalidTransition {
                    attribute,
                    target,
                    reason: "already in the requested position",
                });
            }
            _ => {}
        }

        let handle = TransitionHandle::new();
        self.pending.insert(
            handle,
            PendingTransition {
                handle,
                attribute,
                target,
                previous: current,
            },
        );
        self.states
            .insert(attribute, MechanismState::Transitioning(target));

        debug!(%attribute, %target, %handle, from = %current, "transition started");
        Ok(handle)
    }

    /// Apply the outcome of a transition. Each handle resolves exactly once.
    pub fn resolve_transition(
        &mut self,
        handle: TransitionHandle,
        outcome: Outcome,
    ) -> Result<MechanismState, RegistryError> {
        let pending = self
            .pending
            .remove(&handle)
            .ok_or(RegistryError::UnknownHandle(handle))?;

        let next = match outcome {
            Outcome::Success => MechanismState::At(pending.target),
            Outcome::Failure => pending.previous,
        };
        self.states.insert(pending.attribute, next);

        match outcome {
            Outcome::Success => info!(
                attribute = %pending.attribute,
                state = %next,
                %handle,
                "transition complete"
            ),
            Outcome::Failure => warn!(
                attribute = %pending.attribute,
                target = %pending.target,
                reverted_to = %next,
                %handle,
                "transition failed, state reverted"
            ),
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_registry() -> MechanismRegistry {
        MechanismRegistry::with_positions([Position::Closed])
    }

    #[test]
    fn test_unconfigured_attributes_start_unknown() {
        let reg = closed_registry();
        assert_eq!(reg.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Closed));
        assert_eq!(reg.get(MechanismAttribute::LatchedUnlatched), MechanismState::Unknown);
        assert_eq!(reg.get(MechanismAttribute::LockedUnlocked), MechanismState::Unknown);
    }

    #[test]
    fn test_success_sets_target() {
        let mut reg = closed_registry();
        let h = reg
            .begin_transition(MechanismAttribute::OpenClosed, Position::Open)
            .unwrap();
        assert_eq!(
            reg.get(MechanismAttribute::OpenClosed),
            MechanismState::Transitioning(Position::Open)
        );

        let state = reg.resolve_transition(h, Outcome::Success).unwrap();
        assert_eq!(state, MechanismState::At(Position::Open));
        assert_eq!(reg.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Open));
        assert!(reg.pending().is_empty());
    }

    #[test]
    fn test_failure_reverts() {
        let mut reg = closed_registry();
        let h = reg
            .begin_transition(MechanismAttribute::OpenClosed, Position::Open)
            .unwrap();
        reg.resolve_transition(h, Outcome::Failure).unwrap();
        assert_eq!(reg.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Closed));
    }

    #[test]
    fn test_failure_from_unknown_reverts_to_unknown() {
        let mut reg = MechanismRegistry::new();
        let h = reg
            .begin_transition(MechanismAttribute::LockedUnlocked, Position::Locked)
            .unwrap();
        reg.resolve_transition(h, Outcome::Failure).unwrap();
        assert_eq!(reg.get(MechanismAttribute::LockedUnlocked), MechanismState::Unknown);
    }

    #[test]
    fn test_noop_target_is_invalid() {
        let mut reg = closed_registry();
        let err = reg
            .begin_transition(MechanismAttribute::OpenClosed, Position::Closed)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
        assert_eq!(reg.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Closed));
    }

    #[test]
    fn test_foreign_position_is_invalid() {
        let mut reg = closed_registry();
        let err = reg
            .begin_transition(MechanismAttribute::OpenClosed, Position::Locked)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
    }

    #[test]
    fn test_second_begin_while_in_flight() {
        let mut reg = closed_registry();
        reg.begin_transition(MechanismAttribute::OpenClosed, Position::Open)
            .unwrap();
        // Even the opposite target is refused while in flight.
        let err = reg
            .begin_transition(MechanismAttribute::OpenClosed, Position::Closed)
            .unwrap_err();
        assert_eq!(err, RegistryError::TransitionInProgress(MechanismAttribute::OpenClosed));
    }

    #[test]
    fn test_resolving_twice_is_an_error() {
        let mut reg = closed_registry();
        let h = reg
            .begin_transition(MechanismAttribute::OpenClosed, Position::Open)
            .unwrap();
        reg.resolve_transition(h, Outcome::Success).unwrap();
        assert_eq!(
            reg.resolve_transition(h, Outcome::Success).unwrap_err(),
            RegistryError::UnknownHandle(h)
        );
    }

    #[test]
    fn test_unknown_handle() {
        let mut reg = closed_registry();
        let bogus = TransitionHandle::from(Uuid::new_v4());
        assert!(matches!(
            reg.resolve_transition(bogus, Outcome::Failure),
            Err(RegistryError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_attributes_transition_independently() {
        let mut reg = MechanismRegistry::with_positions([
            Position::Closed,
            Position::Latched,
            Position::Locked,
        ]);
        let unlock = reg
            .begin_transition(MechanismAttribute::LockedUnlocked, Position::Unlocked)
            .unwrap();
        let unlatch = reg
            .begin_transition(MechanismAttribute::LatchedUnlatched, Position::Unlatched)
            .unwrap();
        assert_eq!(reg.pending().len(), 2);

        reg.resolve_transition(unlatch, Outcome::Success).unwrap();
        reg.resolve_transition(unlock, Outcome::Failure).unwrap();

        let snap = reg.snapshot();
        assert_eq!(snap.get(MechanismAttribute::LatchedUnlatched), MechanismState::At(Position::Unlatched));
        assert_eq!(snap.get(MechanismAttribute::LockedUnlocked), MechanismState::At(Position::Locked));
        assert_eq!(snap.get(MechanismAttribute::OpenClosed), MechanismState::At(Position::Closed));
    }
}
