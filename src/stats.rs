//! Statistics snapshots for telemetry and UI display.

use serde::{Deserialize, Serialize};

/// Snapshot of the simulator's storage and scheduling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorStats {
    /// Slots in gate storage, including decommissioned ones
    pub gate_slots: usize,

    /// Gates that are currently simulated
    pub live_gates: usize,

    /// Holes waiting for the next compaction
    pub decommissioned_gates: usize,

    /// Ticks evaluated since creation
    pub ticks_run: u64,

    /// Measured ticks per second
    pub average_tickrate: u64,

    /// Configured ticks per minute
    pub target_tickrate: u64,

    pub throttled: bool,

    /// Whether the realistic gate model is on
    pub realistic: bool,

    pub running: bool,
}

/// Snapshot of the evaluator and everything below it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorStats {
    pub simulator: SimulatorStats,

    /// Gates with a stable middle id
    pub mapped_gates: usize,

    /// Gates whose simulated kind follows their fan-in
    pub watched_gates: usize,

    /// Leaf addresses in the address tree
    pub addresses: usize,

    /// Integrated-circuit definitions known to the evaluator
    pub circuits: usize,
}

impl SimulatorStats {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "gate_slots": self.gate_slots,
            "live_gates": self.live_gates,
            "decommissioned_gates": self.decommissioned_gates,
            "ticks_run": self.ticks_run,
            "average_tickrate": self.average_tickrate,
            "target_tickrate": self.target_tickrate,
            "throttled": self.throttled,
            "realistic": self.realistic,
            "running": self.running,
        })
    }
}

impl EvaluatorStats {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "simulator": self.simulator.to_value(),
            "mapped_gates": self.mapped_gates,
            "watched_gates": self.watched_gates,
            "addresses": self.addresses,
            "circuits": self.circuits,
        })
    }

    /// Pretty-printed JSON, for writing to a file or a log line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
