//! Fan-in driven gate substitution.
//!
//! Some gates behave differently once something drives them. An input
//! placeholder holds its own value while unconnected but must act as a wire
//! once connected. [`GateSubstituter`] watches such gates and rebuilds the
//! simulated gate under the same middle id whenever the number of recorded
//! inputs crosses the gate's threshold.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::EvalConfig;
use crate::gate::GateKind;
use crate::logic_state::LogicState;
use crate::optimizer::{EvalConnection, SimulatorOptimizer};
use crate::simulator::{LogicSimulator, PauseGuard, SimError, SimResult};
use crate::types::{MiddleId, SimulatorId};

/// Which kind to simulate below and at/above an input-count threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub few_inputs: GateKind,
    pub many_inputs: GateKind,
    pub threshold: usize,
}

impl SubstitutionRule {
    /// Switch or button: holds a user-set value until something drives it.
    pub const DUMMY_INPUT: SubstitutionRule = SubstitutionRule {
        few_inputs: GateKind::CopySelfOutput,
        many_inputs: GateKind::Junction,
        threshold: 1,
    };

    /// Tick button: pulses for one tick until something drives it.
    pub const TICK_INPUT: SubstitutionRule = SubstitutionRule {
        few_inputs: GateKind::TickInput,
        many_inputs: GateKind::Junction,
        threshold: 1,
    };

    pub fn new(few_inputs: GateKind, many_inputs: GateKind, threshold: usize) -> Self {
        Self {
            few_inputs,
            many_inputs,
            threshold,
        }
    }

    pub fn kind_for(&self, inputs: usize) -> GateKind {
        if inputs >= self.threshold {
            self.many_inputs
        } else {
            self.few_inputs
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct WatchedGate {
    rule: SubstitutionRule,
    current: GateKind,
}

pub struct GateSubstituter {
    optimizer: SimulatorOptimizer,
    watched: HashMap<MiddleId, WatchedGate>,
}

impl GateSubstituter {
    pub fn new(optimizer: SimulatorOptimizer) -> Self {
        Self {
            optimizer,
            watched: HashMap::new(),
        }
    }

    pub fn from_config(config: &EvalConfig) -> Self {
        Self::new(SimulatorOptimizer::from_config(config))
    }

    pub fn optimizer(&self) -> &SimulatorOptimizer {
        &self.optimizer
    }

    pub(crate) fn simulator(&self) -> &LogicSimulator {
        self.optimizer.simulator()
    }

    pub fn pause(&self) -> PauseGuard {
        self.optimizer.pause()
    }

    /// Adds a gate whose kind never changes with fan-in.
    pub fn add_gate(&mut self, guard: &PauseGuard, kind: GateKind, middle: MiddleId) -> SimResult<()> {
        self.optimizer.add_gate(guard, kind, middle).map(|_| ())
    }

    /// Adds a gate whose kind follows `rule`. It starts with no inputs.
    pub fn add_watched_gate(
        &mut self,
        guard: &PauseGuard,
        rule: SubstitutionRule,
        middle: MiddleId,
    ) -> SimResult<()> {
        let current = rule.kind_for(0);
        self.optimizer.add_gate(guard, current, middle)?;
        self.watched.insert(middle, WatchedGate { rule, current });
        Ok(())
    }

    pub fn ensure_removable(&self, middle: MiddleId) -> SimResult<()> {
        self.optimizer.ensure_removable(middle)
    }

    /// Removes a gate and re-evaluates every watched gate it drove.
    pub fn remove_gate(&mut self, guard: &PauseGuard, middle: MiddleId) -> SimResult<()> {
        let mut affected: Vec<MiddleId> = self
            .optimizer
            .outputs(middle)
            .iter()
            .map(|c| c.destination.gate)
            .filter(|&gate| gate != middle && self.watched.contains_key(&gate))
            .collect();
        affected.sort_unstable();
        affected.dedup();

        self.optimizer.remove_gate(guard, middle)?;
        self.watched.remove(&middle);
        for gate in affected {
            self.reevaluate(guard, gate)?;
        }
        Ok(())
    }

    pub fn make_connection(&mut self, guard: &PauseGuard, connection: EvalConnection) -> SimResult<()> {
        self.optimizer.make_connection(guard, connection)?;
        self.reevaluate(guard, connection.destination.gate)
    }

    pub fn remove_connection(&mut self, guard: &PauseGuard, connection: EvalConnection) -> SimResult<()> {
        self.optimizer.remove_connection(guard, connection)?;
        self.reevaluate(guard, connection.destination.gate)
    }

    /// Changes the simulated kind of an unwatched gate in place.
    ///
    /// Wires and the current output survive. A watched gate stops being
    /// watched.
    pub fn retype_gate(&mut self, guard: &PauseGuard, middle: MiddleId, kind: GateKind) -> SimResult<()> {
        let current = self
            .optimizer
            .gate_kind(middle)
            .ok_or(SimError::UnknownMiddleId(middle))?;
        self.watched.remove(&middle);
        if current != kind {
            self.rebuild(guard, middle, kind)?;
        }
        Ok(())
    }

    fn reevaluate(&mut self, guard: &PauseGuard, middle: MiddleId) -> SimResult<()> {
        let Some(watch) = self.watched.get(&middle).copied() else {
            return Ok(());
        };
        let inputs = self.optimizer.inputs(middle).len();
        let desired = watch.rule.kind_for(inputs);
        if desired == watch.current {
            return Ok(());
        }

        self.rebuild(guard, middle, desired)?;
        if let Some(watch) = self.watched.get_mut(&middle) {
            watch.current = desired;
        }
        tracing::debug!(middle, from = %watch.current, to = %desired, inputs, "gate substituted");
        Ok(())
    }

    /// Removes and re-adds the simulated gate under the same middle id,
    /// restoring every wire and the output value.
    fn rebuild(&mut self, guard: &PauseGuard, middle: MiddleId, kind: GateKind) -> SimResult<()> {
        let previous_id = self
            .optimizer
            .simulator_id(middle)
            .ok_or(SimError::UnknownMiddleId(middle))?;
        let state = self.optimizer.get_state(middle)?;
        let inputs = self.optimizer.inputs(middle).to_vec();
        // Self-loops are in both lists; restore them once.
        let outputs: Vec<EvalConnection> = self
            .optimizer
            .outputs(middle)
            .iter()
            .filter(|c| !c.is_self_loop())
            .copied()
            .collect();

        self.optimizer.remove_gate(guard, middle)?;
        self.optimizer
            .add_gate_preferring(guard, kind, middle, previous_id)?;
        for connection in inputs.into_iter().chain(outputs) {
            self.optimizer.make_connection(guard, connection)?;
        }
        self.optimizer.set_state(middle, state)
    }

    pub fn compress(&mut self, guard: &PauseGuard) -> HashMap<SimulatorId, SimulatorId> {
        self.optimizer.compress(guard)
    }

    pub fn get_state(&self, middle: MiddleId) -> SimResult<LogicState> {
        self.optimizer.get_state(middle)
    }

    pub fn set_state(&self, middle: MiddleId, state: LogicState) -> SimResult<()> {
        self.optimizer.set_state(middle, state)
    }

    pub fn get_states(&self, middles: &[MiddleId]) -> SimResult<Vec<LogicState>> {
        self.optimizer.get_states(middles)
    }

    pub fn set_states(&self, middles: &[MiddleId], states: &[LogicState]) -> SimResult<()> {
        self.optimizer.set_states(middles, states)
    }

    /// Kind currently simulated for `middle`.
    pub fn current_kind(&self, middle: MiddleId) -> Option<GateKind> {
        self.optimizer.gate_kind(middle)
    }

    pub fn is_watched(&self, middle: MiddleId) -> bool {
        self.watched.contains_key(&middle)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}
