use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Actuator, Command, CommandIntent, DispatchError};
use crate::mechanism::{
    MechanismAttribute, MechanismRegistry, MechanismState, Outcome, Position, TransitionHandle,
};

/// Owns the registry and forwards accepted commands to the actuator.
///
/// At most one command per attribute is outstanding; a second `issue` for the
/// same attribute fails with [`DispatchError::Busy`] until the first resolves.
pub struct Dispatcher {
    registry: MechanismRegistry,
    actuator: Arc<dyn Actuator>,
    in_flight: BTreeMap<MechanismAttribute, TransitionHandle>,
}

impl Dispatcher {
    pub fn new(registry: MechanismRegistry, actuator: Arc<dyn Actuator>) -> Self {
        Self {
            registry,
            actuator,
            in_flight: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &MechanismRegistry {
        &self.registry
    }

    pub fn get(&self, attribute: MechanismAttribute) -> MechanismState {
        self.registry.get(attribute)
    }

    /// Attributes with an unresolved command and the handle that owns each.
    pub fn in_flight(&self) -> &BTreeMap<MechanismAttribute, TransitionHandle> {
        &self.in_flight
    }

    pub fn issue(
        &mut self,
        attribute: MechanismAttribute,
        target: Position,
    ) -> Result<TransitionHandle, DispatchError> {
        if let Some(owner) = self.in_flight.get(&attribute) {
            debug!(%attribute, %target, %owner, "command refused, attribute busy");
            return Err(DispatchError::Busy(attribute));
        }

        let intent = CommandIntent::new(attribute, target);
        let handle = self.registry.begin_transition(attribute, target)?;

        if let Err(source) = self.actuator.actuate(&intent, handle) {
            warn!(%attribute, %target, error = %source, "actuator rejected command");
            self.registry.resolve_transition(handle, Outcome::Failure)?;
            return Err(DispatchError::Rejected { attribute, source });
        }

        self.in_flight.insert(attribute, handle);
        Ok(handle)
    }

    pub fn issue_command(&mut self, command: Command) -> Result<TransitionHandle, DispatchError> {
        self.issue(command.attribute(), command.target())
    }

    /// Report the outcome of a previously issued command.
    pub fn resolve(
        &mut self,
        handle: TransitionHandle,
        outcome: Outcome,
    ) -> Result<MechanismState, DispatchError> {
        let attribute = self
            .registry
            .pending_for(handle)
            .map(|p| p.attribute);
        let state = self.registry.resolve_transition(handle, outcome)?;
        if let Some(attribute) = attribute {
            self.in_flight.remove(&attribute);
        }
        Ok(state)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
