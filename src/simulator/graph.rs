//! Gate arena and double-buffered state.
//!
//! Slot index equals simulator id, so removal only flips a slot to
//! [`GateKind::None`] and never moves another gate. Holes are reclaimed by
//! [`GateGraph::compress`].

use std::collections::{HashMap, VecDeque};

use crate::gate::{self, GateConnection, GateKind, Phase};
use crate::logic_state::LogicState;
use crate::types::{PortId, SimulatorId};

use super::{SimError, SimResult};

/// Lists at least this long are evaluated with rayon when `parallel` is on.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 4096;

#[derive(Clone, Debug)]
pub(crate) struct GateSlot {
    pub(crate) kind: GateKind,
    /// One list of drivers per input group.
    pub(crate) inputs: Vec<Vec<GateConnection>>,
    /// Driven gates and the input group each binding lands in.
    pub(crate) outputs: Vec<GateConnection>,
}

impl GateSlot {
    fn new(kind: GateKind) -> Self {
        Self {
            kind,
            inputs: vec![Vec::new(); kind.input_groups()],
            outputs: Vec::new(),
        }
    }

    fn decommissioned() -> Self {
        Self::new(GateKind::None)
    }

    fn first_driver(&self, group: usize) -> Option<&GateConnection> {
        self.inputs.get(group).and_then(|drivers| drivers.first())
    }
}

/// Evaluation order, rebuilt lazily after topology edits.
#[derive(Debug, Default)]
struct Schedule {
    /// Non-junction phases, each sorted by kind so runs are type-homogeneous.
    phases: [Vec<SimulatorId>; 3],
    /// Junctions in dependency order.
    junctions: Vec<SimulatorId>,
    /// Junctions from this index on sit on or behind a junction cycle.
    cyclic_from: usize,
}

#[derive(Debug, Default)]
pub(crate) struct GateGraph {
    slots: Vec<GateSlot>,
    current: Vec<LogicState>,
    next: Vec<LogicState>,
    decommissioned: usize,
    schedule: Schedule,
    schedule_dirty: bool,
    realistic: bool,
}

impl GateGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_realistic(&self) -> bool {
        self.realistic
    }

    /// Switches the gate model. Takes effect from the next tick and reset.
    pub(crate) fn set_realistic(&mut self, realistic: bool) {
        self.realistic = realistic;
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn decommissioned_count(&self) -> usize {
        self.decommissioned
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.decommissioned
    }

    fn live_slot(&self, id: SimulatorId) -> SimResult<&GateSlot> {
        match self.slots.get(id as usize) {
            None => Err(SimError::UnknownGate(id)),
            Some(slot) if slot.kind.is_none() => Err(SimError::Decommissioned(id)),
            Some(slot) => Ok(slot),
        }
    }

    fn live_slot_mut(&mut self, id: SimulatorId) -> SimResult<&mut GateSlot> {
        match self.slots.get_mut(id as usize) {
            None => Err(SimError::UnknownGate(id)),
            Some(slot) if slot.kind.is_none() => Err(SimError::Decommissioned(id)),
            Some(slot) => Ok(slot),
        }
    }

    pub(crate) fn kind(&self, id: SimulatorId) -> SimResult<GateKind> {
        self.live_slot(id).map(|slot| slot.kind)
    }

    pub(crate) fn inputs(&self, id: SimulatorId, port: PortId) -> SimResult<Vec<GateConnection>> {
        let slot = self.live_slot(id)?;
        slot.inputs
            .get(port as usize)
            .cloned()
            .ok_or(SimError::PortOutOfRange { gate: id, port })
    }

    pub(crate) fn outputs(&self, id: SimulatorId) -> SimResult<Vec<GateConnection>> {
        Ok(self.live_slot(id)?.outputs.clone())
    }

    /// Appends a gate at the high-water mark.
    pub(crate) fn add_gate(&mut self, kind: GateKind) -> SimResult<SimulatorId> {
        if kind.is_none() {
            return Err(SimError::InvalidKind(kind));
        }
        let id = self.slots.len() as SimulatorId;
        self.push_slot(GateSlot::new(kind));
        self.schedule_dirty = true;
        Ok(id)
    }

    /// Places a gate at `id`, filling a decommissioned slot or growing storage.
    pub(crate) fn add_gate_at(&mut self, kind: GateKind, id: SimulatorId) -> SimResult<()> {
        if kind.is_none() {
            return Err(SimError::InvalidKind(kind));
        }
        let index = id as usize;
        if let Some(slot) = self.slots.get_mut(index) {
            if !slot.kind.is_none() {
                return Err(SimError::IdInUse(id));
            }
            *slot = GateSlot::new(kind);
            let initial = kind.reset_state(self.realistic);
            self.current[index] = initial;
            self.next[index] = initial;
            self.decommissioned -= 1;
        } else {
            while self.slots.len() < index {
                self.push_slot(GateSlot::decommissioned());
                self.decommissioned += 1;
            }
            self.push_slot(GateSlot::new(kind));
        }
        self.schedule_dirty = true;
        Ok(())
    }

    fn push_slot(&mut self, slot: GateSlot) {
        let initial = slot.kind.reset_state(self.realistic);
        self.slots.push(slot);
        self.current.push(initial);
        self.next.push(initial);
    }

    /// Decommissions a gate and strips every reference to it.
    pub(crate) fn remove_gate(&mut self, id: SimulatorId) -> SimResult<()> {
        let slot = self.live_slot_mut(id)?;
        let inputs = std::mem::take(&mut slot.inputs);
        let outputs = std::mem::take(&mut slot.outputs);
        slot.kind = GateKind::None;

        for driver in inputs.iter().flatten() {
            if let Some(source) = self.slots.get_mut(driver.gate as usize) {
                source.outputs.retain(|c| c.gate != id);
            }
        }
        for driven in &outputs {
            if let Some(dest) = self.slots.get_mut(driven.gate as usize) {
                for group in &mut dest.inputs {
                    group.retain(|c| c.gate != id);
                }
            }
        }

        self.decommissioned += 1;
        self.schedule_dirty = true;
        Ok(())
    }

    pub(crate) fn connect(
        &mut self,
        source: SimulatorId,
        source_port: PortId,
        dest: SimulatorId,
        dest_port: PortId,
    ) -> SimResult<()> {
        let source_kind = self.live_slot(source)?.kind;
        if source_port as usize >= source_kind.output_groups() {
            return Err(SimError::PortOutOfRange { gate: source, port: source_port });
        }
        let dest_slot = self.live_slot(dest)?;
        let Some(group) = dest_slot.inputs.get(dest_port as usize) else {
            return Err(SimError::PortOutOfRange { gate: dest, port: dest_port });
        };
        if !dest_slot.kind.accepts_fan_in(dest_port) && !group.is_empty() {
            return Err(SimError::PortOccupied { gate: dest, port: dest_port });
        }

        self.slots[dest as usize].inputs[dest_port as usize]
            .push(GateConnection::new(source, source_port));
        self.slots[source as usize]
            .outputs
            .push(GateConnection::new(dest, dest_port));
        self.schedule_dirty = true;
        Ok(())
    }

    /// Removes one binding between the two ports.
    pub(crate) fn disconnect(
        &mut self,
        source: SimulatorId,
        source_port: PortId,
        dest: SimulatorId,
        dest_port: PortId,
    ) -> SimResult<()> {
        self.live_slot(source)?;
        let missing = SimError::NoSuchConnection {
            from: source,
            from_port: source_port,
            to: dest,
            to_port: dest_port,
        };
        let dest_slot = self.live_slot_mut(dest)?;
        let Some(group) = dest_slot.inputs.get_mut(dest_port as usize) else {
            return Err(SimError::PortOutOfRange { gate: dest, port: dest_port });
        };
        let driver = GateConnection::new(source, source_port);
        let Some(position) = group.iter().position(|c| *c == driver) else {
            return Err(missing);
        };
        group.remove(position);

        let driven = GateConnection::new(dest, dest_port);
        let outputs = &mut self.slots[source as usize].outputs;
        if let Some(position) = outputs.iter().position(|c| *c == driven) {
            outputs.remove(position);
        }
        self.schedule_dirty = true;
        Ok(())
    }

    pub(crate) fn state(&self, id: SimulatorId) -> SimResult<LogicState> {
        self.live_slot(id)?;
        Ok(self.current[id as usize])
    }

    /// Writes both buffers so the value is visible before and after a swap.
    pub(crate) fn set_state(&mut self, id: SimulatorId, state: LogicState) -> SimResult<()> {
        self.live_slot(id)?;
        self.current[id as usize] = state;
        self.next[id as usize] = state;
        Ok(())
    }

    /// Puts every output back to its reset state. Topology is untouched.
    pub(crate) fn reset(&mut self) {
        for (index, slot) in self.slots.iter().enumerate() {
            let state = slot.kind.reset_state(self.realistic);
            self.current[index] = state;
            self.next[index] = state;
        }
    }

    /// Advances every live gate by one generation.
    pub(crate) fn tick(&mut self) {
        if self.schedule_dirty {
            self.rebuild_schedule();
        }
        let Self {
            slots,
            current,
            next,
            schedule,
            realistic,
            ..
        } = self;

        for ids in &schedule.phases {
            evaluate_batch(slots, current, next, ids);
        }
        if *realistic {
            for &id in &schedule.phases[Phase::Combinational.index()] {
                let index = id as usize;
                next[index] = gate::eval_realistic(current[index], next[index]);
            }
        }
        settle_junctions(slots, next, schedule);
        std::mem::swap(current, next);
    }

    /// Compacts live gates into `0..live_count` preserving their order.
    ///
    /// Returns the old-id to new-id map for every surviving gate.
    pub(crate) fn compress(&mut self) -> HashMap<SimulatorId, SimulatorId> {
        let mut remap = HashMap::with_capacity(self.live_count());
        let mut next_id: SimulatorId = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.kind.is_none() {
                remap.insert(index as SimulatorId, next_id);
                next_id += 1;
            }
        }

        let slots = std::mem::take(&mut self.slots);
        let current = std::mem::take(&mut self.current);
        let next = std::mem::take(&mut self.next);
        let translate = |c: &mut GateConnection| match remap.get(&c.gate) {
            Some(&new_id) => {
                c.gate = new_id;
                true
            }
            None => false,
        };

        for (index, mut slot) in slots.into_iter().enumerate() {
            if slot.kind.is_none() {
                continue;
            }
            for group in &mut slot.inputs {
                group.retain_mut(translate);
            }
            slot.outputs.retain_mut(translate);
            self.slots.push(slot);
            self.current.push(current[index]);
            self.next.push(next[index]);
        }

        self.decommissioned = 0;
        self.schedule_dirty = true;
        remap
    }

    fn rebuild_schedule(&mut self) {
        let mut phases: [Vec<SimulatorId>; 3] = Default::default();
        let mut junctions = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.kind.phase() {
                Some(Phase::Junction) => junctions.push(index as SimulatorId),
                Some(phase) => phases[phase.index()].push(index as SimulatorId),
                None => {}
            }
        }
        for ids in &mut phases {
            ids.sort_by_key(|&id| (self.slots[id as usize].kind as u8, id));
        }

        let (junctions, cyclic_from) = order_junctions(&self.slots, junctions);
        self.schedule = Schedule {
            phases,
            junctions,
            cyclic_from,
        };
        self.schedule_dirty = false;
    }
}

/// Orders junctions so every junction follows the junctions driving it.
///
/// Uses Kahn's algorithm over junction-to-junction edges. Junctions left
/// over (on a cycle or downstream of one) are appended in id order and the
/// returned index marks where they start.
fn order_junctions(slots: &[GateSlot], junctions: Vec<SimulatorId>) -> (Vec<SimulatorId>, usize) {
    let is_junction = |id: SimulatorId| {
        slots
            .get(id as usize)
            .is_some_and(|slot| slot.kind == GateKind::Junction)
    };

    let mut in_degree: HashMap<SimulatorId, usize> = HashMap::with_capacity(junctions.len());
    for &id in &junctions {
        let degree = slots[id as usize]
            .inputs
            .iter()
            .flatten()
            .filter(|c| is_junction(c.gate))
            .count();
        in_degree.insert(id, degree);
    }

    let mut queue: VecDeque<SimulatorId> = junctions
        .iter()
        .copied()
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut order = Vec::with_capacity(junctions.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for driven in &slots[id as usize].outputs {
            if let Some(degree) = in_degree.get_mut(&driven.gate) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(driven.gate);
                }
            }
        }
    }

    let cyclic_from = order.len();
    if cyclic_from != junctions.len() {
        order.extend(junctions.into_iter().filter(|id| in_degree[id] > 0));
    }
    (order, cyclic_from)
}

fn evaluate_gate(slot: &GateSlot, own: LogicState, current: &[LogicState]) -> LogicState {
    let read = |c: &GateConnection| current[c.gate as usize];
    match slot.kind {
        GateKind::TickInput | GateKind::ConstantOff => LogicState::Low,
        GateKind::ConstantOn => LogicState::High,
        GateKind::CopySelfOutput => own,
        GateKind::Buffer => slot.first_driver(0).map(read).unwrap_or(LogicState::Undefined),
        GateKind::TristateBuffer | GateKind::TristateBufferInverted => gate::eval_tristate(
            slot.first_driver(0).map(read),
            slot.first_driver(1).map(read),
            slot.kind.is_inverted(),
        ),
        GateKind::Junction => gate::eval_junction(slot.inputs.iter().flatten().map(read)),
        GateKind::None => own,
        kind => gate::eval_combinational(kind, slot.inputs.iter().flatten().map(read))
            .unwrap_or(LogicState::Undefined),
    }
}

fn evaluate_batch(
    slots: &[GateSlot],
    current: &[LogicState],
    next: &mut [LogicState],
    ids: &[SimulatorId],
) {
    #[cfg(feature = "parallel")]
    if ids.len() >= PARALLEL_THRESHOLD {
        use rayon::prelude::*;

        let results: Vec<LogicState> = ids
            .par_iter()
            .map(|&id| evaluate_gate(&slots[id as usize], current[id as usize], current))
            .collect();
        for (&id, state) in ids.iter().zip(results) {
            next[id as usize] = state;
        }
        return;
    }

    for &id in ids {
        let index = id as usize;
        next[index] = evaluate_gate(&slots[index], current[index], current);
    }
}

/// Junctions read the buffer being written, so they see this tick's values.
fn settle_junctions(slots: &[GateSlot], next: &mut [LogicState], schedule: &Schedule) {
    let (ordered, cyclic) = schedule.junctions.split_at(schedule.cyclic_from);
    for &id in ordered {
        let state = merge_drivers(&slots[id as usize], next);
        next[id as usize] = state;
    }
    if cyclic.is_empty() {
        return;
    }

    // Least fixed point from Floating. Each junction can only rise twice.
    for &id in cyclic {
        next[id as usize] = LogicState::Floating;
    }
    for _ in 0..=2 * cyclic.len() {
        let mut changed = false;
        for &id in cyclic {
            let state = merge_drivers(&slots[id as usize], next);
            if state != next[id as usize] {
                next[id as usize] = state;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn merge_drivers(slot: &GateSlot, states: &[LogicState]) -> LogicState {
    gate::eval_junction(slot.inputs.iter().flatten().map(|c| states[c.gate as usize]))
}
