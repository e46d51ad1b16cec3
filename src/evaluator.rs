//! Integration point between the circuit model and the simulator.
//!
//! The [`Evaluator`] consumes [`Difference`]s, keeps an [`AddressTree`] from
//! block addresses to middle ids, and drives the [`GateSubstituter`] stack
//! while the simulator is parked. Integrated circuits are expanded in place:
//! placing a `custom` block creates a branch in the tree and replays the
//! circuit's definition inside it.
//!
//! ```
//! use logic_eval::{Address, BlockKind, Difference, Evaluator, LogicState, Position};
//!
//! let mut evaluator = Evaluator::new();
//! let edit = Difference::new()
//!     .place((0, 0), BlockKind::Switch)
//!     .place((1, 0), BlockKind::Nor)
//!     .place((2, 0), BlockKind::Light)
//!     .connect((0, 0), (1, 0), 0)
//!     .connect((1, 0), (2, 0), 0);
//! evaluator.make_edit(&edit, evaluator.root_circuit()).unwrap();
//!
//! let switch = Address::of(Position::new(0, 0));
//! let light = Address::of(Position::new(2, 0));
//! evaluator.set_state(&switch, LogicState::High).unwrap();
//! evaluator.run_ticks(2);
//! assert_eq!(evaluator.get_state(&light), Some(LogicState::Low));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::address::Address;
use crate::address_tree::{AddressTree, AddressTreeError};
use crate::config::EvalConfig;
use crate::difference::{BlockGate, Difference, Modification, PortRef};
use crate::gate::GateKind;
use crate::id_provider::IdProvider;
use crate::logic_state::LogicState;
use crate::optimizer::{EvalConnection, EvalConnectionPoint};
use crate::simulator::{LogicSimulator, PauseGuard, SimError};
use crate::stats::EvaluatorStats;
use crate::substituter::{GateSubstituter, SubstitutionRule};
use crate::types::{CircuitId, MiddleId, PortId};

/// Errors raised by the evaluator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Tree(#[from] AddressTreeError),

    #[error("circuit {0} is not registered")]
    UnknownCircuit(CircuitId),

    #[error("no block at {0}")]
    AddressNotFound(Address),

    #[error("circuit {0} would contain itself")]
    RecursiveCircuit(CircuitId),

    #[error("circuit {circuit} has no port {port}")]
    NoSuchIcPort { circuit: CircuitId, port: PortId },

    #[error("{addresses} addresses but {states} states")]
    LengthMismatch { addresses: usize, states: usize },
}

impl EvalError {
    /// Errors confined to a single modification. The rest of the batch
    /// still applies.
    fn is_local(&self) -> bool {
        matches!(
            self,
            EvalError::Tree(_)
                | EvalError::AddressNotFound(_)
                | EvalError::NoSuchIcPort { .. }
                | EvalError::Sim(
                    SimError::PortOccupied { .. }
                        | SimError::PortOutOfRange { .. }
                        | SimError::NoSuchConnection { .. }
                )
        )
    }
}

/// Result type for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

/// An inner block port exposed on an integrated circuit's boundary.
pub type IcPort = PortRef;

/// Contents and boundary of an integrated circuit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcDefinition {
    /// Modifications that build the circuit from empty
    pub difference: Difference,

    /// Input port k of the circuit is `inputs[k]`
    pub inputs: Vec<IcPort>,

    /// Output port k of the circuit is `outputs[k]`
    pub outputs: Vec<IcPort>,
}

impl IcDefinition {
    pub fn new(difference: Difference, inputs: Vec<IcPort>, outputs: Vec<IcPort>) -> Self {
        Self {
            difference,
            inputs,
            outputs,
        }
    }
}

/// Outcome of [`Evaluator::make_edit`].
///
/// Counts include modifications replayed into integrated-circuit instances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EditSummary {
    pub applied: usize,
    pub skipped: usize,
    /// Whether storage was compacted afterwards
    pub removed_any: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

pub struct Evaluator {
    substituter: GateSubstituter,
    middle_ids: IdProvider<MiddleId>,
    address_tree: AddressTree<MiddleId>,
    circuits: HashMap<CircuitId, IcDefinition>,
}

impl Evaluator {
    /// Creates a paused evaluator with the default configuration.
    pub fn new() -> Self {
        Self::from_config(&EvalConfig::default())
    }

    /// Creates an evaluator and registers every circuit in `config`.
    pub fn from_config(config: &EvalConfig) -> Self {
        let circuits = config
            .circuits
            .iter()
            .map(|circuit| (circuit.id, circuit.definition()))
            .collect();
        tracing::info!(
            root = config.root_circuit,
            circuits = config.circuits.len(),
            tickrate = config.target_tickrate,
            "evaluator created"
        );
        Self {
            substituter: GateSubstituter::from_config(config),
            middle_ids: IdProvider::new(),
            address_tree: AddressTree::new(config.root_circuit),
            circuits,
        }
    }

    pub fn root_circuit(&self) -> CircuitId {
        self.address_tree.root_container()
    }

    fn simulator(&self) -> &LogicSimulator {
        self.substituter.simulator()
    }

    /// Registers or replaces an integrated circuit.
    ///
    /// Existing instances keep their contents; later placements use the
    /// new definition.
    pub fn register_circuit(&mut self, circuit: CircuitId, definition: IcDefinition) -> EvalResult<()> {
        if circuit == self.root_circuit() {
            tracing::error!(circuit, "cannot register the root circuit as an integrated circuit");
            return Err(EvalError::RecursiveCircuit(circuit));
        }
        if self.circuits.insert(circuit, definition).is_some() {
            tracing::debug!(circuit, "circuit definition replaced");
        }
        Ok(())
    }

    pub fn definition(&self, circuit: CircuitId) -> Option<&IcDefinition> {
        self.circuits.get(&circuit)
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Applies `difference` to every instance of `circuit`.
    ///
    /// The simulator stays parked for the whole batch, so no tick observes
    /// a partial edit. Modifications that miss (unknown address, occupied
    /// position, missing wire) are logged and skipped. Storage is compacted
    /// afterwards if anything was removed. For an integrated circuit the
    /// difference is also appended to its definition.
    ///
    /// An edit that would make `circuit` contain itself, at any depth, is
    /// rejected before anything is applied.
    pub fn make_edit(&mut self, difference: &Difference, circuit: CircuitId) -> EvalResult<EditSummary> {
        if circuit != self.root_circuit() && !self.circuits.contains_key(&circuit) {
            tracing::error!(circuit, "edit for unregistered circuit");
            return Err(EvalError::UnknownCircuit(circuit));
        }
        if difference
            .placed_circuits()
            .any(|placed| self.reaches(placed, circuit))
        {
            tracing::error!(circuit, "edit would make the circuit contain itself");
            return Err(EvalError::RecursiveCircuit(circuit));
        }

        let guard = self.substituter.pause();
        let mut summary = EditSummary::default();
        let instances = self.address_tree.addresses_of_container(circuit);
        let mut outcome = Ok(());
        for prefix in &instances {
            outcome = self.apply_difference(&guard, prefix, difference, &mut summary);
            if outcome.is_err() {
                break;
            }
        }

        if summary.removed_any {
            let remap = self.substituter.compress(&guard);
            tracing::debug!(gates = remap.len(), "gate storage compacted");
        }
        outcome?;

        if let Some(definition) = self.circuits.get_mut(&circuit) {
            definition.difference.extend(difference);
        }
        tracing::debug!(
            circuit,
            instances = instances.len(),
            applied = summary.applied,
            skipped = summary.skipped,
            "edit applied"
        );
        Ok(summary)
    }

    /// Whether an instance of `from` contains `target` at any depth.
    fn reaches(&self, from: CircuitId, target: CircuitId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(circuit) = stack.pop() {
            if circuit == target {
                return true;
            }
            if !seen.insert(circuit) {
                continue;
            }
            if let Some(definition) = self.circuits.get(&circuit) {
                stack.extend(definition.difference.placed_circuits());
            }
        }
        false
    }

    fn apply_difference(
        &mut self,
        guard: &PauseGuard,
        prefix: &Address,
        difference: &Difference,
        summary: &mut EditSummary,
    ) -> EvalResult<()> {
        for modification in difference.modifications() {
            match self.apply_modification(guard, prefix, modification, summary) {
                Ok(()) => summary.applied += 1,
                Err(e) if e.is_local() => {
                    tracing::warn!(prefix = %prefix, ?modification, error = %e, "modification skipped");
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn apply_modification(
        &mut self,
        guard: &PauseGuard,
        prefix: &Address,
        modification: &Modification,
        summary: &mut EditSummary,
    ) -> EvalResult<()> {
        match modification {
            Modification::PlaceBlock { position, kind, .. } => {
                let address = prefix.with(*position);
                match kind.gate() {
                    BlockGate::Fixed(kind) => self.place_gate(guard, &address, kind, None),
                    BlockGate::Substituted(rule) => {
                        self.place_gate(guard, &address, rule.kind_for(0), Some(rule))
                    }
                    BlockGate::Circuit(circuit) => self.place_circuit(guard, &address, circuit, summary),
                }
            }
            Modification::RemoveBlock { position } => {
                self.remove_block(guard, &prefix.with(*position), summary)
            }
            Modification::MoveBlock { from, to } => {
                self.address_tree.move_entry(prefix, *from, *to)?;
                Ok(())
            }
            Modification::CreateConnection { output, input } => {
                let connection = self.resolve_connection(prefix, *output, *input)?;
                self.substituter.make_connection(guard, connection)?;
                Ok(())
            }
            Modification::RemoveConnection { output, input } => {
                let connection = self.resolve_connection(prefix, *output, *input)?;
                self.substituter.remove_connection(guard, connection)?;
                Ok(())
            }
            Modification::SetData { position, data } => {
                let address = prefix.with(*position);
                let middle = self.lookup(&address)?;
                match self.substituter.current_kind(middle) {
                    Some(GateKind::ConstantOn | GateKind::ConstantOff) => {
                        let kind = if *data != 0 {
                            GateKind::ConstantOn
                        } else {
                            GateKind::ConstantOff
                        };
                        self.substituter.retype_gate(guard, middle, kind)?;
                    }
                    _ => tracing::trace!(address = %address, data, "data carries no evaluation meaning"),
                }
                Ok(())
            }
        }
    }

    fn place_gate(
        &mut self,
        guard: &PauseGuard,
        address: &Address,
        kind: GateKind,
        rule: Option<SubstitutionRule>,
    ) -> EvalResult<()> {
        let middle = self.middle_ids.get_new_id();
        if let Err(e) = self.address_tree.add_value(address, middle) {
            self.middle_ids.release_id(middle);
            return Err(e.into());
        }

        let added = match rule {
            Some(rule) => self.substituter.add_watched_gate(guard, rule, middle),
            None => self.substituter.add_gate(guard, kind, middle),
        };
        if let Err(e) = added {
            self.address_tree.remove_value(address);
            self.middle_ids.release_id(middle);
            return Err(e.into());
        }
        tracing::trace!(address = %address, middle, %kind, "block placed");
        Ok(())
    }

    fn place_circuit(
        &mut self,
        guard: &PauseGuard,
        address: &Address,
        circuit: CircuitId,
        summary: &mut EditSummary,
    ) -> EvalResult<()> {
        let definition = self
            .circuits
            .get(&circuit)
            .cloned()
            .ok_or(EvalError::UnknownCircuit(circuit))?;
        let parent = address.parent().unwrap_or_default();
        if self.address_tree.containers_along(&parent).contains(&circuit) {
            tracing::error!(circuit, address = %address, "recursive circuit placement");
            return Err(EvalError::RecursiveCircuit(circuit));
        }

        self.address_tree.make_branch(address, circuit)?;
        if let Err(e) = self.apply_difference(guard, address, &definition.difference, summary) {
            self.remove_block(guard, address, summary)?;
            return Err(e);
        }
        tracing::debug!(circuit, address = %address, "circuit instantiated");
        Ok(())
    }

    /// Removes a block or a whole circuit instance. Nothing is touched
    /// unless every gate below `address` can be removed.
    fn remove_block(&mut self, guard: &PauseGuard, address: &Address, summary: &mut EditSummary) -> EvalResult<()> {
        let middles = self
            .address_tree
            .values_at(address)
            .ok_or_else(|| EvalError::AddressNotFound(address.clone()))?;
        for &middle in &middles {
            self.substituter.ensure_removable(middle)?;
        }

        for middle in middles {
            self.substituter.remove_gate(guard, middle)?;
            self.middle_ids.release_id(middle);
            summary.removed_any = true;
        }
        if self.address_tree.remove_value(address).is_none() {
            self.address_tree.remove_branch(address);
        }
        tracing::trace!(address = %address, "block removed");
        Ok(())
    }

    fn resolve_connection(&self, prefix: &Address, output: PortRef, input: PortRef) -> EvalResult<EvalConnection> {
        Ok(EvalConnection::new(
            self.resolve_port(prefix, output, Side::Output)?,
            self.resolve_port(prefix, input, Side::Input)?,
        ))
    }

    /// Follows a block port down through integrated-circuit boundaries to
    /// the gate that implements it.
    fn resolve_port(&self, prefix: &Address, port: PortRef, side: Side) -> EvalResult<EvalConnectionPoint> {
        let mut address = prefix.with(port.block);
        let mut port_id = port.port;
        loop {
            if let Some(&middle) = self.address_tree.get(&address) {
                return Ok(EvalConnectionPoint::new(middle, port_id));
            }
            let circuit = self
                .address_tree
                .container_of(&address)
                .ok_or_else(|| EvalError::AddressNotFound(address.clone()))?;
            let definition = self
                .circuits
                .get(&circuit)
                .ok_or(EvalError::UnknownCircuit(circuit))?;
            let boundary = match side {
                Side::Input => &definition.inputs,
                Side::Output => &definition.outputs,
            };
            let inner = boundary
                .get(port_id as usize)
                .ok_or(EvalError::NoSuchIcPort { circuit, port: port_id })?;
            address.push(inner.block);
            port_id = inner.port;
        }
    }

    fn lookup(&self, address: &Address) -> EvalResult<MiddleId> {
        self.address_tree
            .get(address)
            .copied()
            .ok_or_else(|| EvalError::AddressNotFound(address.clone()))
    }

    // ------------------------------------------------------------------
    // State access
    // ------------------------------------------------------------------

    /// Output of the block at `address`, `None` if there is none.
    pub fn get_state(&self, address: &Address) -> Option<LogicState> {
        let middle = self.address_tree.get(address)?;
        self.substituter.get_state(*middle).ok()
    }

    /// Overwrites the output of the block at `address`. Visible to the next
    /// tick and to readers immediately.
    pub fn set_state(&self, address: &Address, state: LogicState) -> EvalResult<()> {
        let middle = self.lookup(address)?;
        Ok(self.substituter.set_state(middle, state)?)
    }

    /// Reads every address from one consistent tick. Misses are `None`.
    pub fn get_states(&self, addresses: &[Address]) -> Vec<Option<LogicState>> {
        let middles: Vec<Option<MiddleId>> = addresses
            .iter()
            .map(|address| self.address_tree.get(address).copied())
            .collect();
        let present: Vec<MiddleId> = middles.iter().flatten().copied().collect();
        let mut states = match self.substituter.get_states(&present) {
            Ok(states) => states.into_iter(),
            Err(e) => {
                tracing::error!(error = %e, "bulk state read failed");
                return vec![None; addresses.len()];
            }
        };
        middles
            .iter()
            .map(|middle| middle.and_then(|_| states.next()))
            .collect()
    }

    /// Like [`get_states`](Self::get_states) with every address below `origin`.
    pub fn get_states_relative(&self, origin: &Address, addresses: &[Address]) -> Vec<Option<LogicState>> {
        let absolute: Vec<Address> = addresses.iter().map(|a| origin.join(a)).collect();
        self.get_states(&absolute)
    }

    /// Writes all states or none of them.
    pub fn set_states(&self, addresses: &[Address], states: &[LogicState]) -> EvalResult<()> {
        if addresses.len() != states.len() {
            return Err(EvalError::LengthMismatch {
                addresses: addresses.len(),
                states: states.len(),
            });
        }
        let middles = addresses
            .iter()
            .map(|address| self.lookup(address))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(self.substituter.set_states(&middles, states)?)
    }

    // ------------------------------------------------------------------
    // Simulation control
    // ------------------------------------------------------------------

    /// Target rate in ticks per minute.
    pub fn set_tickrate(&self, ticks_per_minute: u64) {
        self.simulator().set_target_tickrate(ticks_per_minute);
    }

    pub fn target_tickrate(&self) -> u64 {
        self.simulator().target_tickrate()
    }

    pub fn set_throttled(&self, throttle: bool) {
        self.simulator().set_throttled(throttle);
    }

    pub fn is_throttled(&self) -> bool {
        self.simulator().is_throttled()
    }

    /// Chooses the realistic gate model: combinational gates reset to
    /// UNDEFINED and pass through UNDEFINED whenever their output flips.
    pub fn set_realistic(&self, realistic: bool) {
        self.simulator().set_realistic(realistic);
    }

    pub fn is_realistic(&self) -> bool {
        self.simulator().is_realistic()
    }

    pub fn set_pause(&self, pause: bool) {
        if pause {
            self.simulator().signal_to_pause();
        } else {
            self.simulator().signal_to_proceed();
        }
    }

    pub fn is_paused(&self) -> bool {
        !self.simulator().is_running()
    }

    /// Puts every output back to its reset state. Topology is untouched.
    pub fn reset(&self) {
        self.simulator().reset();
    }

    /// Measured ticks per second, 0 while paused.
    pub fn get_average_tickrate(&self) -> u64 {
        self.simulator().average_tickrate()
    }

    /// Runs `count` ticks synchronously with the worker parked.
    pub fn run_ticks(&self, count: u64) {
        let guard = self.substituter.pause();
        self.simulator().run_ticks(&guard, count);
    }

    pub fn ticks_run(&self) -> u64 {
        self.simulator().ticks_run()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// True if a block or circuit instance sits at `address`.
    pub fn contains(&self, address: &Address) -> bool {
        self.address_tree.contains_value(address) || self.address_tree.contains_branch(address)
    }

    pub fn middle_id(&self, address: &Address) -> Option<MiddleId> {
        self.address_tree.get(address).copied()
    }

    /// Kind currently simulated for the block at `address`.
    pub fn gate_kind(&self, address: &Address) -> Option<GateKind> {
        self.substituter.current_kind(*self.address_tree.get(address)?)
    }

    pub fn stats(&self) -> EvaluatorStats {
        EvaluatorStats {
            simulator: self.simulator().stats(),
            mapped_gates: self.substituter.optimizer().gate_count(),
            watched_gates: self.substituter.watched_count(),
            addresses: self.address_tree.len(),
            circuits: self.circuits.len(),
        }
    }

    pub fn export_stats(&self) -> serde_json::Value {
        self.stats().to_value()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("root_circuit", &self.root_circuit())
            .field("blocks", &self.address_tree.len())
            .field("circuits", &self.circuits.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Position;
    use crate::difference::BlockKind;

    fn at(x: i32, y: i32) -> Address {
        Address::of(Position::new(x, y))
    }

    fn inverter() -> Difference {
        Difference::new()
            .place((0, 0), BlockKind::Switch)
            .place((1, 0), BlockKind::Nor)
            .place((2, 0), BlockKind::Light)
            .connect((0, 0), (1, 0), 0)
            .connect((1, 0), (2, 0), 0)
    }

    fn inverter_circuit() -> IcDefinition {
        IcDefinition::new(
            inverter(),
            vec![PortRef::new(Position::new(0, 0), 0)],
            vec![PortRef::new(Position::new(2, 0), 0)],
        )
    }

    #[test]
    fn test_place_and_drive() {
        let mut evaluator = Evaluator::new();
        let summary = evaluator.make_edit(&inverter(), 0).unwrap();
        assert_eq!(summary.applied, 5);
        assert_eq!(summary.skipped, 0);
        assert!(!summary.removed_any);

        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&at(2, 0)), Some(LogicState::High));

        evaluator.set_state(&at(0, 0), LogicState::High).unwrap();
        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&at(1, 0)), Some(LogicState::Low));
        assert_eq!(evaluator.get_state(&at(2, 0)), Some(LogicState::Low));
    }

    #[test]
    fn test_lookup_miss() {
        let evaluator = Evaluator::new();
        assert_eq!(evaluator.get_state(&at(4, 4)), None);
        assert_eq!(
            evaluator.set_state(&at(4, 4), LogicState::High),
            Err(EvalError::AddressNotFound(at(4, 4)))
        );
        let deep = Address::new(vec![Position::new(1, 1), Position::new(2, 2)]);
        assert_eq!(evaluator.get_state(&deep), None);
    }

    #[test]
    fn test_misses_are_skipped() {
        let mut evaluator = Evaluator::new();
        let edit = Difference::new()
            .place((0, 0), BlockKind::And)
            .place((0, 0), BlockKind::Or)
            .connect((5, 5), (0, 0), 0)
            .remove((9, 9));
        let summary = evaluator.make_edit(&edit, 0).unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(evaluator.gate_kind(&at(0, 0)), Some(GateKind::And));
    }

    #[test]
    fn test_switch_is_substituted_when_driven() {
        let mut evaluator = Evaluator::new();
        let edit = Difference::new()
            .place((0, 0), BlockKind::Constant)
            .place((1, 0), BlockKind::Switch)
            .connect((0, 0), (1, 0), 0);
        evaluator.make_edit(&edit, 0).unwrap();
        assert_eq!(evaluator.gate_kind(&at(1, 0)), Some(GateKind::Junction));

        evaluator
            .make_edit(&Difference::new().disconnect((0, 0), (1, 0), 0), 0)
            .unwrap();
        assert_eq!(evaluator.gate_kind(&at(1, 0)), Some(GateKind::CopySelfOutput));
    }

    #[test]
    fn test_remove_compacts() {
        let mut evaluator = Evaluator::new();
        evaluator.make_edit(&inverter(), 0).unwrap();
        let summary = evaluator
            .make_edit(&Difference::new().remove((1, 0)), 0)
            .unwrap();
        assert!(summary.removed_any);
        assert!(!evaluator.contains(&at(1, 0)));

        let stats = evaluator.stats();
        assert_eq!(stats.mapped_gates, 2);
        assert_eq!(stats.simulator.decommissioned_gates, 0);
        assert_eq!(stats.simulator.gate_slots, 2);

        evaluator.set_state(&at(0, 0), LogicState::High).unwrap();
        assert_eq!(evaluator.get_state(&at(0, 0)), Some(LogicState::High));
    }

    #[test]
    fn test_move_keeps_wires() {
        let mut evaluator = Evaluator::new();
        evaluator.make_edit(&inverter(), 0).unwrap();
        evaluator
            .make_edit(&Difference::new().move_block((0, 0), (0, 3)), 0)
            .unwrap();
        assert!(!evaluator.contains(&at(0, 0)));

        evaluator.set_state(&at(0, 3), LogicState::High).unwrap();
        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&at(2, 0)), Some(LogicState::Low));
    }

    #[test]
    fn test_set_data_on_constant() {
        let mut evaluator = Evaluator::new();
        let edit = Difference::new()
            .place((0, 0), BlockKind::Constant)
            .place((1, 0), BlockKind::Light)
            .connect((0, 0), (1, 0), 0);
        evaluator.make_edit(&edit, 0).unwrap();
        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&at(1, 0)), Some(LogicState::High));

        evaluator
            .make_edit(&Difference::new().set_data((0, 0), 0), 0)
            .unwrap();
        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&at(1, 0)), Some(LogicState::Low));
        assert_eq!(evaluator.gate_kind(&at(0, 0)), Some(GateKind::ConstantOff));
    }

    #[test]
    fn test_integrated_circuit_ports() {
        let mut evaluator = Evaluator::new();
        evaluator.register_circuit(1, inverter_circuit()).unwrap();
        let edit = Difference::new()
            .place((0, 0), BlockKind::Switch)
            .place((1, 0), BlockKind::Custom(1))
            .place((2, 0), BlockKind::Light)
            .connect((0, 0), (1, 0), 0)
            .connect((1, 0), (2, 0), 0);
        evaluator.make_edit(&edit, 0).unwrap();

        let ic = at(1, 0);
        assert!(evaluator.contains(&ic));
        assert_eq!(
            evaluator.gate_kind(&ic.with(Position::new(0, 0))),
            Some(GateKind::Junction)
        );

        evaluator.set_state(&at(0, 0), LogicState::High).unwrap();
        evaluator.run_ticks(2);
        assert_eq!(evaluator.get_state(&at(2, 0)), Some(LogicState::Low));

        evaluator.set_state(&at(0, 0), LogicState::Low).unwrap();
        evaluator.run_ticks(2);
        assert_eq!(evaluator.get_state(&at(2, 0)), Some(LogicState::High));
        assert_eq!(
            evaluator.get_states_relative(&ic, &[Address::of(Position::new(1, 0))]),
            vec![Some(LogicState::High)]
        );
    }

    #[test]
    fn test_edit_reaches_every_instance() {
        let mut evaluator = Evaluator::new();
        evaluator.register_circuit(1, inverter_circuit()).unwrap();
        let edit = Difference::new()
            .place((0, 0), BlockKind::Custom(1))
            .place((5, 0), BlockKind::Custom(1));
        evaluator.make_edit(&edit, 0).unwrap();

        let summary = evaluator
            .make_edit(&Difference::new().place((3, 3), BlockKind::Constant), 1)
            .unwrap();
        assert_eq!(summary.applied, 2);
        assert!(evaluator.contains(&at(0, 0).with(Position::new(3, 3))));
        assert!(evaluator.contains(&at(5, 0).with(Position::new(3, 3))));
        assert_eq!(evaluator.definition(1).map(|d| d.difference.len()), Some(6));
    }

    #[test]
    fn test_recursive_circuit_rejected() {
        let mut evaluator = Evaluator::new();
        let selfish = IcDefinition::new(
            Difference::new().place((0, 0), BlockKind::Custom(2)),
            Vec::new(),
            Vec::new(),
        );
        evaluator.register_circuit(2, selfish).unwrap();

        let result = evaluator.make_edit(&Difference::new().place((1, 1), BlockKind::Custom(2)), 0);
        assert_eq!(result, Err(EvalError::RecursiveCircuit(2)));
        assert!(!evaluator.contains(&at(1, 1)));
        assert_eq!(evaluator.register_circuit(0, IcDefinition::default()), Err(EvalError::RecursiveCircuit(0)));
    }

    #[test]
    fn test_edit_cannot_make_circuit_contain_itself() {
        let mut evaluator = Evaluator::new();
        evaluator.register_circuit(1, IcDefinition::default()).unwrap();
        let wrapper = IcDefinition::new(
            Difference::new().place((0, 0), BlockKind::Custom(1)),
            Vec::new(),
            Vec::new(),
        );
        evaluator.register_circuit(2, wrapper).unwrap();

        // Directly, and through circuit 2. Neither has a live instance yet.
        let direct = Difference::new().place((0, 0), BlockKind::Custom(1));
        assert_eq!(evaluator.make_edit(&direct, 1), Err(EvalError::RecursiveCircuit(1)));
        let transitive = Difference::new()
            .place((1, 0), BlockKind::And)
            .place((3, 0), BlockKind::Custom(2));
        assert_eq!(evaluator.make_edit(&transitive, 1), Err(EvalError::RecursiveCircuit(1)));
        assert_eq!(evaluator.definition(1), Some(&IcDefinition::default()));

        // Both circuits can still be placed.
        let edit = Difference::new()
            .place((5, 5), BlockKind::Custom(1))
            .place((6, 6), BlockKind::Custom(2));
        let summary = evaluator.make_edit(&edit, 0).unwrap();
        assert_eq!(summary.skipped, 0);
        assert!(evaluator.contains(&at(6, 6).with(Position::new(0, 0))));
    }

    #[test]
    fn test_failed_removal_keeps_tables_in_sync() {
        let mut evaluator = Evaluator::new();
        evaluator.register_circuit(1, inverter_circuit()).unwrap();
        evaluator.make_edit(&inverter(), 0).unwrap();
        evaluator
            .make_edit(&Difference::new().place((4, 0), BlockKind::Custom(1)), 0)
            .unwrap();
        let ic = at(4, 0);
        let light = ic.with(Position::new(2, 0));
        let before = evaluator.stats();
        assert_eq!(before.mapped_gates, 6);

        // Free the inner light's slot without telling the evaluator.
        let middle = evaluator.middle_id(&light).unwrap();
        let sim = evaluator.substituter.optimizer().simulator_id(middle).unwrap();
        {
            let guard = evaluator.substituter.pause();
            evaluator.simulator().remove_gate(&guard, sim).unwrap();
        }
        let broken = Err(EvalError::Sim(SimError::Decommissioned(sim)));

        // Removing the whole instance fails before anything is removed.
        let result = evaluator.make_edit(&Difference::new().remove((4, 0)), 0);
        assert_eq!(result, broken);
        assert!(evaluator.contains(&ic));
        assert!(evaluator.contains(&ic.with(Position::new(0, 0))));
        assert_eq!(evaluator.get_state(&ic.with(Position::new(1, 0))), Some(LogicState::Low));

        // So does removing the light itself.
        let result = evaluator.make_edit(&Difference::new().remove((2, 0)), 1);
        assert_eq!(result, broken);
        assert_eq!(evaluator.middle_id(&light), Some(middle));
        assert_eq!(evaluator.definition(1).map(|d| d.difference.len()), Some(5));

        let after = evaluator.stats();
        assert_eq!(after.mapped_gates, before.mapped_gates);
        assert_eq!(after.addresses, before.addresses);
    }

    #[test]
    fn test_realistic_model() {
        let config = EvalConfig {
            realistic: true,
            ..EvalConfig::default()
        };
        let mut evaluator = Evaluator::from_config(&config);
        assert!(evaluator.is_realistic());
        evaluator.make_edit(&inverter(), 0).unwrap();

        let (switch, nor, light) = (at(0, 0), at(1, 0), at(2, 0));
        assert_eq!(evaluator.get_state(&nor), Some(LogicState::Undefined));
        assert_eq!(evaluator.get_state(&light), Some(LogicState::Low));

        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&light), Some(LogicState::High));

        // A flip is seen as one tick of UNDEFINED.
        evaluator.set_state(&switch, LogicState::High).unwrap();
        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&light), Some(LogicState::Undefined));
        evaluator.run_ticks(1);
        assert_eq!(evaluator.get_state(&light), Some(LogicState::Low));

        evaluator.reset();
        assert_eq!(
            evaluator.get_states(&[switch.clone(), nor.clone(), light.clone()]),
            vec![Some(LogicState::Low), Some(LogicState::Undefined), Some(LogicState::Low)]
        );

        evaluator.set_realistic(false);
        evaluator.reset();
        assert_eq!(evaluator.get_state(&nor), Some(LogicState::Low));
        assert!(!evaluator.stats().simulator.realistic);
    }

    #[test]
    fn test_unknown_circuit() {
        let mut evaluator = Evaluator::new();
        assert_eq!(
            evaluator.make_edit(&Difference::new(), 7),
            Err(EvalError::UnknownCircuit(7))
        );
        assert_eq!(
            evaluator.make_edit(&Difference::new().place((0, 0), BlockKind::Custom(7)), 0),
            Err(EvalError::UnknownCircuit(7))
        );
    }

    #[test]
    fn test_bulk_states() {
        let mut evaluator = Evaluator::new();
        evaluator.make_edit(&inverter(), 0).unwrap();
        let addresses = [at(0, 0), at(9, 9), at(2, 0)];
        assert_eq!(
            evaluator.get_states(&addresses),
            vec![Some(LogicState::Low), None, Some(LogicState::Low)]
        );

        assert!(matches!(
            evaluator.set_states(&addresses, &[LogicState::High]),
            Err(EvalError::LengthMismatch { addresses: 3, states: 1 })
        ));
        assert_eq!(
            evaluator.set_states(&addresses, &[LogicState::High; 3]),
            Err(EvalError::AddressNotFound(at(9, 9)))
        );
        // Nothing was written.
        assert_eq!(evaluator.get_state(&at(0, 0)), Some(LogicState::Low));
    }

    #[test]
    fn test_pause_controls() {
        let evaluator = Evaluator::new();
        assert!(evaluator.is_paused());
        evaluator.set_pause(false);
        assert!(!evaluator.is_paused());
        evaluator.set_pause(true);
        assert!(evaluator.is_paused());
        assert_eq!(evaluator.get_average_tickrate(), 0);
    }
}
