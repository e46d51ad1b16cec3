//! # logic-eval
//!
//! A tick-driven, background-threaded evaluation engine for four-valued
//! digital logic circuits. Circuits are edited incrementally while the
//! simulation keeps running between edits.
//!
//! ## Layers
//!
//! - **LogicSimulator**: owns the gate arena and double-buffered state, and
//!   runs the tick loop on a worker thread at a target rate, under an ideal
//!   or a realistic gate model. Edits require
//!   a [`PauseGuard`], so the graph is never changed mid-tick.
//! - **SimulatorOptimizer**: maps stable middle ids to the simulator's
//!   compaction-sensitive ids and records every wire.
//! - **GateSubstituter**: swaps the simulated kind of input placeholders
//!   when they gain or lose drivers, keeping their identity.
//! - **Evaluator**: applies [`Difference`] change-sets from the circuit
//!   model, resolves nested [`Address`]es through an [`AddressTree`], and
//!   expands integrated circuits.
//!
//! ## Features
//!
//! - `parallel` - Evaluate large non-junction phases with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use logic_eval::{Address, BlockKind, Difference, Evaluator, LogicState, Position};
//!
//! let mut evaluator = Evaluator::new();
//!
//! // A switch driving a light through an AND gate fed by a constant
//! let edit = Difference::new()
//!     .place((0, 0), BlockKind::Switch)
//!     .place((0, 1), BlockKind::Constant)
//!     .place((1, 0), BlockKind::And)
//!     .place((2, 0), BlockKind::Light)
//!     .connect((0, 0), (1, 0), 0)
//!     .connect((0, 1), (1, 0), 0)
//!     .connect((1, 0), (2, 0), 0);
//! evaluator.make_edit(&edit, evaluator.root_circuit()).unwrap();
//!
//! evaluator.set_state(&Address::of(Position::new(0, 0)), LogicState::High).unwrap();
//! evaluator.run_ticks(2);
//! assert_eq!(
//!     evaluator.get_state(&Address::of(Position::new(2, 0))),
//!     Some(LogicState::High)
//! );
//!
//! // Or let the worker tick in the background
//! evaluator.set_tickrate(6000);
//! evaluator.set_pause(false);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use logic_eval::{EvalConfig, Evaluator};
//!
//! let config = EvalConfig::from_yaml_file("circuits.yaml")?;
//! logic_eval::init_logging(&config.log_level);
//! let evaluator = Evaluator::from_config(&config);
//! ```

pub mod types;
pub mod logic_state;
pub mod gate;
pub mod simulator;
pub mod id_provider;
pub mod optimizer;
pub mod substituter;
pub mod address;
pub mod address_tree;
pub mod difference;
pub mod evaluator;
pub mod config;
pub mod stats;

// Re-export commonly used types
pub use types::{CircuitId, MiddleId, PortId, SimulatorId};
pub use logic_state::LogicState;
pub use gate::{GateConnection, GateKind};
pub use simulator::{LogicSimulator, PauseGuard, SimError, SimResult, DEFAULT_TICKRATE};
pub use id_provider::IdProvider;
pub use optimizer::{EvalConnection, EvalConnectionPoint, SimulatorOptimizer};
pub use substituter::{GateSubstituter, SubstitutionRule};
pub use address::{Address, Position};
pub use address_tree::{AddressTree, AddressTreeError};
pub use difference::{BlockKind, Difference, Modification, PortRef, Rotation};
pub use evaluator::{EditSummary, EvalError, EvalResult, Evaluator, IcDefinition, IcPort};
pub use config::{CircuitConfig, ConfigError, EvalConfig, EvalConfigBuilder};
pub use stats::{EvaluatorStats, SimulatorStats};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// logic_eval::init_logging("debug");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
