//! The live gate graph and its background tick thread.
//!
//! [`LogicSimulator`] owns gate storage, the double-buffered state arrays and
//! one worker thread. Reads take a shared lock and may happen at any time.
//! Topology edits require a [`PauseGuard`], which is only handed out once the
//! worker has parked between ticks.
//!
//! # Example
//!
//! ```rust
//! use logic_eval::{GateKind, LogicSimulator, LogicState};
//!
//! let sim = LogicSimulator::new();
//! let guard = sim.pause();
//! let on = sim.add_gate(&guard, GateKind::ConstantOn).unwrap();
//! let not = sim.add_gate(&guard, GateKind::Nor).unwrap();
//! sim.connect(&guard, on, 0, not, 0).unwrap();
//! sim.run_ticks(&guard, 2);
//! assert_eq!(sim.get_state(not).unwrap(), LogicState::Low);
//! ```

mod graph;
mod tickrate;
mod worker;

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::EvalConfig;
use crate::gate::{GateConnection, GateKind};
use crate::logic_state::LogicState;
use crate::stats::SimulatorStats;
use crate::types::{MiddleId, PortId, SimulatorId};

use graph::GateGraph;
use tickrate::TickrateMonitor;

/// Errors raised by the simulator and the layers wrapping it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("gate {0} does not exist")]
    UnknownGate(SimulatorId),

    #[error("gate {0} is decommissioned")]
    Decommissioned(SimulatorId),

    #[error("gate kind {0} cannot be simulated")]
    InvalidKind(GateKind),

    #[error("simulator id {0} is already in use")]
    IdInUse(SimulatorId),

    #[error("port {port} is out of range for gate {gate}")]
    PortOutOfRange { gate: SimulatorId, port: PortId },

    #[error("input port {port} of gate {gate} already has a driver")]
    PortOccupied { gate: SimulatorId, port: PortId },

    #[error("no connection from {from}:{from_port} to {to}:{to_port}")]
    NoSuchConnection {
        from: SimulatorId,
        from_port: PortId,
        to: SimulatorId,
        to_port: PortId,
    },

    #[error("{ids} ids but {states} states")]
    LengthMismatch { ids: usize, states: usize },

    #[error("middle id {0} is not mapped to a gate")]
    UnknownMiddleId(MiddleId),

    #[error("middle id {0} is already mapped to a gate")]
    MiddleIdInUse(MiddleId),
}

/// Result type for simulator operations.
pub type SimResult<T> = Result<T, SimError>;

/// Default rate: 40 ticks per second.
pub const DEFAULT_TICKRATE: u64 = 40 * 60;

#[derive(Debug)]
struct Control {
    running: bool,
    pause_requests: u32,
    parked: bool,
    stop: bool,
    /// Ticks per minute.
    target_tickrate: u64,
    throttle: bool,
    deadline_reset: bool,
}

impl Control {
    fn tick_period(&self) -> Duration {
        Duration::from_nanos(60_000_000_000 / self.target_tickrate.max(1))
    }
}

pub(crate) struct Shared {
    graph: RwLock<GateGraph>,
    control: Mutex<Control>,
    wake: Condvar,
    ticks: AtomicU64,
    monitor: Mutex<TickrateMonitor>,
}

impl Shared {
    fn tick(&self) {
        self.graph.write().tick();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.monitor.lock().record_tick(Instant::now());
    }
}

/// Proof that the worker is parked between ticks.
///
/// Obtained from [`LogicSimulator::pause`]. While any guard is alive the
/// worker stays parked. Dropping the last guard lets it continue if the
/// simulator is running.
#[must_use = "the simulator resumes as soon as the guard is dropped"]
pub struct PauseGuard {
    shared: Arc<Shared>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        let mut control = self.shared.control.lock();
        control.pause_requests = control.pause_requests.saturating_sub(1);
        drop(control);
        self.shared.wake.notify_all();
    }
}

impl std::fmt::Debug for PauseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseGuard").finish_non_exhaustive()
    }
}

/// Tick-driven four-valued gate simulator with a background worker.
pub struct LogicSimulator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl LogicSimulator {
    /// Creates a paused simulator at the default rate.
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_TICKRATE, true, false, false)
    }

    /// Creates a simulator from the rate and gate-model settings of `config`.
    pub fn from_config(config: &EvalConfig) -> Self {
        Self::with_settings(
            config.target_tickrate,
            config.throttle,
            config.start_running,
            config.realistic,
        )
    }

    fn with_settings(target_tickrate: u64, throttle: bool, running: bool, realistic: bool) -> Self {
        let mut graph = GateGraph::new();
        graph.set_realistic(realistic);
        let shared = Arc::new(Shared {
            graph: RwLock::new(graph),
            control: Mutex::new(Control {
                running,
                pause_requests: 0,
                parked: true,
                stop: false,
                target_tickrate,
                throttle,
                deadline_reset: false,
            }),
            wake: Condvar::new(),
            ticks: AtomicU64::new(0),
            monitor: Mutex::new(TickrateMonitor::new(Instant::now())),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("logic-sim".to_string())
            .spawn(move || worker::run(worker_shared));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn simulation worker, only run_ticks will advance");
                None
            }
        };

        Self { shared, worker }
    }

    // ------------------------------------------------------------------
    // Pause protocol
    // ------------------------------------------------------------------

    /// Blocks until the worker is parked and keeps it parked while the
    /// returned guard lives.
    pub fn pause(&self) -> PauseGuard {
        let mut control = self.shared.control.lock();
        control.pause_requests += 1;
        self.shared.wake.notify_all();
        while !control.parked {
            self.shared.wake.wait(&mut control);
        }
        drop(control);
        PauseGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Asks the worker to stop ticking. Does not wait.
    pub fn signal_to_pause(&self) {
        self.shared.control.lock().running = false;
        self.shared.wake.notify_all();
    }

    /// Lets the worker tick again once no [`PauseGuard`] is alive.
    pub fn signal_to_proceed(&self) {
        self.shared.control.lock().running = true;
        self.shared.wake.notify_all();
    }

    /// Whether the simulator is set to run (ignoring outstanding guards).
    pub fn is_running(&self) -> bool {
        self.shared.control.lock().running
    }

    /// Whether the worker is parked with no tick in flight.
    pub fn thread_is_waiting(&self) -> bool {
        self.shared.control.lock().parked
    }

    /// Sets the target rate in ticks per minute and restarts the deadline.
    pub fn set_target_tickrate(&self, ticks_per_minute: u64) {
        let mut control = self.shared.control.lock();
        control.target_tickrate = ticks_per_minute.max(1);
        control.deadline_reset = true;
        drop(control);
        self.shared.wake.notify_all();
    }

    pub fn target_tickrate(&self) -> u64 {
        self.shared.control.lock().target_tickrate
    }

    /// Enables or disables rate limiting.
    pub fn set_throttled(&self, throttle: bool) {
        let mut control = self.shared.control.lock();
        control.throttle = throttle;
        control.deadline_reset = true;
        drop(control);
        self.shared.wake.notify_all();
    }

    pub fn is_throttled(&self) -> bool {
        self.shared.control.lock().throttle
    }

    /// Switches between the ideal and the realistic gate model.
    ///
    /// Existing outputs keep their values until the next tick or reset.
    pub fn set_realistic(&self, realistic: bool) {
        self.shared.graph.write().set_realistic(realistic);
        tracing::debug!(realistic, "gate model changed");
    }

    pub fn is_realistic(&self) -> bool {
        self.shared.graph.read().is_realistic()
    }

    /// Measured ticks per second over the last second, 0 while paused.
    pub fn average_tickrate(&self) -> u64 {
        {
            let control = self.shared.control.lock();
            if !control.running || control.pause_requests > 0 {
                return 0;
            }
        }
        self.shared.monitor.lock().ticks_per_second(Instant::now())
    }

    /// Total ticks evaluated since creation.
    pub fn ticks_run(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Topology edits (require a pause guard)
    // ------------------------------------------------------------------

    fn edit<T>(&self, guard: &PauseGuard, f: impl FnOnce(&mut GateGraph) -> SimResult<T>) -> SimResult<T> {
        debug_assert!(
            Arc::ptr_eq(&guard.shared, &self.shared),
            "pause guard belongs to a different simulator"
        );
        debug_assert!(self.thread_is_waiting(), "edit while the worker is not parked");
        let mut graph = self.shared.graph.write();
        f(&mut graph).inspect_err(|e| tracing::error!(error = %e, "rejected simulator edit"))
    }

    /// Adds a gate at the end of storage and returns its id.
    pub fn add_gate(&self, guard: &PauseGuard, kind: GateKind) -> SimResult<SimulatorId> {
        let id = self.edit(guard, |graph| graph.add_gate(kind))?;
        tracing::trace!(id, %kind, "gate added");
        Ok(id)
    }

    /// Adds a gate under a caller-chosen id.
    ///
    /// The slot must be free: decommissioned or past the end of storage.
    pub fn add_gate_at(&self, guard: &PauseGuard, kind: GateKind, id: SimulatorId) -> SimResult<()> {
        self.edit(guard, |graph| graph.add_gate_at(kind, id))?;
        tracing::trace!(id, %kind, "gate added");
        Ok(())
    }

    /// Decommissions a gate and removes every wire touching it.
    pub fn remove_gate(&self, guard: &PauseGuard, id: SimulatorId) -> SimResult<()> {
        self.edit(guard, |graph| graph.remove_gate(id))?;
        tracing::trace!(id, "gate removed");
        Ok(())
    }

    /// Wires `source`'s output port to `dest`'s input group.
    ///
    /// Parallel wires between the same ports are allowed.
    pub fn connect(
        &self,
        guard: &PauseGuard,
        source: SimulatorId,
        source_port: PortId,
        dest: SimulatorId,
        dest_port: PortId,
    ) -> SimResult<()> {
        self.edit(guard, |graph| graph.connect(source, source_port, dest, dest_port))
    }

    /// Removes one wire between the two ports.
    pub fn disconnect(
        &self,
        guard: &PauseGuard,
        source: SimulatorId,
        source_port: PortId,
        dest: SimulatorId,
        dest_port: PortId,
    ) -> SimResult<()> {
        self.edit(guard, |graph| graph.disconnect(source, source_port, dest, dest_port))
    }

    /// Compacts live gates to `0..live_count` and returns the id remap.
    pub fn compress_gates(&self, guard: &PauseGuard) -> HashMap<SimulatorId, SimulatorId> {
        let remap = self
            .edit(guard, |graph| Ok(graph.compress()))
            .unwrap_or_default();
        tracing::debug!(live = remap.len(), "gate storage compacted");
        remap
    }

    /// Advances `count` ticks on the calling thread.
    pub fn run_ticks(&self, guard: &PauseGuard, count: u64) {
        debug_assert!(Arc::ptr_eq(&guard.shared, &self.shared));
        let mut graph = self.shared.graph.write();
        for _ in 0..count {
            graph.tick();
        }
        self.shared.ticks.fetch_add(count, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // State access
    // ------------------------------------------------------------------

    pub fn get_state(&self, id: SimulatorId) -> SimResult<LogicState> {
        self.shared.graph.read().state(id)
    }

    pub fn get_states(&self, ids: &[SimulatorId]) -> SimResult<Vec<LogicState>> {
        let graph = self.shared.graph.read();
        ids.iter().map(|&id| graph.state(id)).collect()
    }

    /// Overwrites a gate's output in both buffers.
    pub fn set_state(&self, id: SimulatorId, state: LogicState) -> SimResult<()> {
        self.shared
            .graph
            .write()
            .set_state(id, state)
            .inspect_err(|e| tracing::error!(error = %e, "rejected state write"))
    }

    /// Writes all states between the same two ticks.
    pub fn set_states(&self, ids: &[SimulatorId], states: &[LogicState]) -> SimResult<()> {
        if ids.len() != states.len() {
            return Err(SimError::LengthMismatch {
                ids: ids.len(),
                states: states.len(),
            });
        }
        let mut graph = self.shared.graph.write();
        for &id in ids {
            graph.state(id)?;
        }
        for (&id, &state) in ids.iter().zip(states) {
            graph.set_state(id, state)?;
        }
        Ok(())
    }

    /// Puts every gate output back to its reset state without touching
    /// topology. That is LOW everywhere unless the realistic model is on.
    pub fn reset(&self) {
        self.shared.graph.write().reset();
        self.shared.monitor.lock().clear(Instant::now());
        tracing::debug!("simulator state reset");
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn gate_kind(&self, id: SimulatorId) -> SimResult<GateKind> {
        self.shared.graph.read().kind(id)
    }

    /// Drivers bound to one input group of a gate.
    pub fn inputs(&self, id: SimulatorId, port: PortId) -> SimResult<Vec<GateConnection>> {
        self.shared.graph.read().inputs(id, port)
    }

    /// Gates driven by `id`, with the input group each binding lands in.
    pub fn outputs(&self, id: SimulatorId) -> SimResult<Vec<GateConnection>> {
        self.shared.graph.read().outputs(id)
    }

    /// Number of slots, live or decommissioned.
    pub fn gate_count(&self) -> usize {
        self.shared.graph.read().len()
    }

    pub fn live_gate_count(&self) -> usize {
        self.shared.graph.read().live_count()
    }

    pub fn decommissioned_count(&self) -> usize {
        self.shared.graph.read().decommissioned_count()
    }

    pub fn stats(&self) -> SimulatorStats {
        let (slots, live, decommissioned) = {
            let graph = self.shared.graph.read();
            (graph.len(), graph.live_count(), graph.decommissioned_count())
        };
        SimulatorStats {
            gate_slots: slots,
            live_gates: live,
            decommissioned_gates: decommissioned,
            ticks_run: self.ticks_run(),
            average_tickrate: self.average_tickrate(),
            target_tickrate: self.target_tickrate(),
            throttled: self.is_throttled(),
            realistic: self.is_realistic(),
            running: self.is_running(),
        }
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        self.stats().to_value()
    }
}

impl Default for LogicSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LogicSimulator {
    fn drop(&mut self) {
        self.shared.control.lock().stop = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("simulation worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for LogicSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicSimulator")
            .field("gates", &self.gate_count())
            .field("ticks_run", &self.ticks_run())
            .field("running", &self.is_running())
            .finish()
    }
}
