//! Identifier types shared by every layer of the evaluation engine.
//!
//! Each layer owns its own identifier space. Ids cross layer boundaries by
//! value only.

/// Identifier of a gate slot inside [`LogicSimulator`](crate::LogicSimulator).
///
/// Stable while the gate is live, but rewritten by compaction.
pub type SimulatorId = u32;

/// Stable gate identifier handed out by the layers above the simulator.
///
/// Survives compaction and gate substitution.
pub type MiddleId = u32;

/// Index of an input or output port group on a gate.
pub type PortId = u32;

/// Identifier of a circuit definition (the root circuit or an integrated circuit).
pub type CircuitId = u32;
