//! Stable-id layer over [`LogicSimulator`].
//!
//! Callers name gates by a [`MiddleId`] they allocate. The optimizer maps it
//! to the simulator's compaction-sensitive id, picks simulator ids with its
//! own [`IdProvider`], and records every wire by middle id so gates can be
//! rebuilt without the caller noticing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::EvalConfig;
use crate::gate::GateKind;
use crate::id_provider::IdProvider;
use crate::logic_state::LogicState;
use crate::simulator::{LogicSimulator, PauseGuard, SimError, SimResult};
use crate::types::{MiddleId, PortId, SimulatorId};

/// One end of a wire, named by middle id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvalConnectionPoint {
    pub gate: MiddleId,
    pub port: PortId,
}

impl EvalConnectionPoint {
    pub fn new(gate: MiddleId, port: PortId) -> Self {
        Self { gate, port }
    }
}

/// A wire from an output port to an input port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvalConnection {
    pub source: EvalConnectionPoint,
    pub destination: EvalConnectionPoint,
}

impl EvalConnection {
    pub fn new(source: EvalConnectionPoint, destination: EvalConnectionPoint) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source.gate == self.destination.gate
    }
}

pub struct SimulatorOptimizer {
    simulator: LogicSimulator,
    sim_ids: IdProvider<SimulatorId>,
    /// Indexed by simulator id.
    middle_of_sim: Vec<Option<MiddleId>>,
    sim_of_middle: HashMap<MiddleId, SimulatorId>,
    kinds: HashMap<MiddleId, GateKind>,
    inputs: HashMap<MiddleId, Vec<EvalConnection>>,
    outputs: HashMap<MiddleId, Vec<EvalConnection>>,
}

impl SimulatorOptimizer {
    pub fn new(simulator: LogicSimulator) -> Self {
        Self {
            simulator,
            sim_ids: IdProvider::new(),
            middle_of_sim: Vec::new(),
            sim_of_middle: HashMap::new(),
            kinds: HashMap::new(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn from_config(config: &EvalConfig) -> Self {
        Self::new(LogicSimulator::from_config(config))
    }

    pub(crate) fn simulator(&self) -> &LogicSimulator {
        &self.simulator
    }

    /// Parks the simulator. See [`LogicSimulator::pause`].
    pub fn pause(&self) -> PauseGuard {
        self.simulator.pause()
    }

    fn resolve(&self, middle: MiddleId) -> SimResult<SimulatorId> {
        self.sim_of_middle.get(&middle).copied().ok_or_else(|| {
            tracing::error!(middle, "middle id is not mapped to a gate");
            SimError::UnknownMiddleId(middle)
        })
    }

    /// Adds a gate under `middle` and returns its simulator id.
    pub fn add_gate(&mut self, guard: &PauseGuard, kind: GateKind, middle: MiddleId) -> SimResult<SimulatorId> {
        self.insert_gate(guard, kind, middle, None)
    }

    /// Like [`add_gate`](Self::add_gate) but reuses `preferred` as the
    /// simulator id when it is still free.
    pub fn add_gate_preferring(
        &mut self,
        guard: &PauseGuard,
        kind: GateKind,
        middle: MiddleId,
        preferred: SimulatorId,
    ) -> SimResult<SimulatorId> {
        self.insert_gate(guard, kind, middle, Some(preferred))
    }

    fn insert_gate(
        &mut self,
        guard: &PauseGuard,
        kind: GateKind,
        middle: MiddleId,
        preferred: Option<SimulatorId>,
    ) -> SimResult<SimulatorId> {
        if kind.is_none() {
            tracing::error!(middle, "refusing to add a gate of kind None");
            return Err(SimError::InvalidKind(kind));
        }
        if self.sim_of_middle.contains_key(&middle) {
            tracing::error!(middle, "middle id is already mapped");
            return Err(SimError::MiddleIdInUse(middle));
        }
        let id = match preferred {
            Some(preferred) => self.sim_ids.get_new_id_preferring(preferred),
            None => self.sim_ids.get_new_id(),
        };
        if let Err(e) = self.simulator.add_gate_at(guard, kind, id) {
            self.sim_ids.release_id(id);
            return Err(e);
        }

        let index = id as usize;
        if self.middle_of_sim.len() <= index {
            self.middle_of_sim.resize(index + 1, None);
        }
        self.middle_of_sim[index] = Some(middle);
        self.sim_of_middle.insert(middle, id);
        self.kinds.insert(middle, kind);
        self.inputs.entry(middle).or_default();
        self.outputs.entry(middle).or_default();
        tracing::debug!(middle, sim = id, %kind, "gate mapped");
        Ok(id)
    }

    /// Fails exactly when [`remove_gate`](Self::remove_gate) would.
    pub fn ensure_removable(&self, middle: MiddleId) -> SimResult<()> {
        let id = self.resolve(middle)?;
        self.simulator.gate_kind(id).map(|_| ())
    }

    /// Removes the gate and every recorded wire touching it.
    pub fn remove_gate(&mut self, guard: &PauseGuard, middle: MiddleId) -> SimResult<()> {
        let id = self.resolve(middle)?;
        self.simulator.remove_gate(guard, id)?;
        self.sim_ids.release_id(id);
        if let Some(slot) = self.middle_of_sim.get_mut(id as usize) {
            *slot = None;
        }
        self.sim_of_middle.remove(&middle);
        self.kinds.remove(&middle);

        for connection in self.inputs.remove(&middle).unwrap_or_default() {
            if let Some(list) = self.outputs.get_mut(&connection.source.gate) {
                list.retain(|c| c.destination.gate != middle);
            }
        }
        for connection in self.outputs.remove(&middle).unwrap_or_default() {
            if let Some(list) = self.inputs.get_mut(&connection.destination.gate) {
                list.retain(|c| c.source.gate != middle);
            }
        }
        tracing::debug!(middle, sim = id, "gate unmapped");
        Ok(())
    }

    pub fn make_connection(&mut self, guard: &PauseGuard, connection: EvalConnection) -> SimResult<()> {
        let source = self.resolve(connection.source.gate)?;
        let destination = self.resolve(connection.destination.gate)?;
        self.simulator.connect(
            guard,
            source,
            connection.source.port,
            destination,
            connection.destination.port,
        )?;
        self.outputs
            .entry(connection.source.gate)
            .or_default()
            .push(connection);
        self.inputs
            .entry(connection.destination.gate)
            .or_default()
            .push(connection);
        tracing::trace!(?connection, "connection made");
        Ok(())
    }

    /// Removes one matching wire.
    pub fn remove_connection(&mut self, guard: &PauseGuard, connection: EvalConnection) -> SimResult<()> {
        let source = self.resolve(connection.source.gate)?;
        let destination = self.resolve(connection.destination.gate)?;
        self.simulator.disconnect(
            guard,
            source,
            connection.source.port,
            destination,
            connection.destination.port,
        )?;
        remove_first(self.outputs.get_mut(&connection.source.gate), &connection);
        remove_first(self.inputs.get_mut(&connection.destination.gate), &connection);
        tracing::trace!(?connection, "connection removed");
        Ok(())
    }

    /// Compacts simulator storage and rewrites the id tables.
    pub fn compress(&mut self, guard: &PauseGuard) -> HashMap<SimulatorId, SimulatorId> {
        let remap = self.simulator.compress_gates(guard);
        let mut middle_of_sim = vec![None; remap.len()];
        for (old, &new) in &remap {
            if let Some(middle) = self.middle_of_sim.get(*old as usize).copied().flatten() {
                middle_of_sim[new as usize] = Some(middle);
                self.sim_of_middle.insert(middle, new);
            }
        }
        self.middle_of_sim = middle_of_sim;
        self.sim_ids.reset(remap.len());
        remap
    }

    pub fn get_state(&self, middle: MiddleId) -> SimResult<LogicState> {
        self.simulator.get_state(self.resolve(middle)?)
    }

    pub fn set_state(&self, middle: MiddleId, state: LogicState) -> SimResult<()> {
        self.simulator.set_state(self.resolve(middle)?, state)
    }

    pub fn get_states(&self, middles: &[MiddleId]) -> SimResult<Vec<LogicState>> {
        let ids = middles
            .iter()
            .map(|&middle| self.resolve(middle))
            .collect::<SimResult<Vec<_>>>()?;
        self.simulator.get_states(&ids)
    }

    pub fn set_states(&self, middles: &[MiddleId], states: &[LogicState]) -> SimResult<()> {
        let ids = middles
            .iter()
            .map(|&middle| self.resolve(middle))
            .collect::<SimResult<Vec<_>>>()?;
        self.simulator.set_states(&ids, states)
    }

    /// Recorded wires ending at `middle`.
    pub fn inputs(&self, middle: MiddleId) -> &[EvalConnection] {
        self.inputs.get(&middle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recorded wires starting at `middle`.
    pub fn outputs(&self, middle: MiddleId) -> &[EvalConnection] {
        self.outputs.get(&middle).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn gate_kind(&self, middle: MiddleId) -> Option<GateKind> {
        self.kinds.get(&middle).copied()
    }

    pub fn simulator_id(&self, middle: MiddleId) -> Option<SimulatorId> {
        self.sim_of_middle.get(&middle).copied()
    }

    pub fn middle_id(&self, sim: SimulatorId) -> Option<MiddleId> {
        self.middle_of_sim.get(sim as usize).copied().flatten()
    }

    /// Number of mapped gates.
    pub fn gate_count(&self) -> usize {
        self.sim_of_middle.len()
    }
}

fn remove_first(list: Option<&mut Vec<EvalConnection>>, connection: &EvalConnection) {
    if let Some(list) = list {
        if let Some(position) = list.iter().position(|c| c == connection) {
            list.remove(position);
        }
    }
}
