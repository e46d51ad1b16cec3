//! Gate kinds, port configuration and four-valued evaluation rules.
//!
//! Evaluation here is pure: the simulator feeds input values read from its
//! state buffers and stores the result.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::logic_state::LogicState;
use crate::types::{PortId, SimulatorId};

/// Closed set of simulated gate kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Decommissioned slot.
    None,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    /// Zero-delay merge of every driver, evaluated after all other gates.
    Junction,
    /// Passes data (group 0) while control (group 1) is HIGH.
    TristateBuffer,
    /// Passes data (group 0) while control (group 1) is LOW.
    TristateBufferInverted,
    ConstantOn,
    ConstantOff,
    /// Holds its own previous output. Used for unconnected inputs.
    CopySelfOutput,
    /// One-tick delay of a single driver.
    Buffer,
    /// Forced LOW every tick, so a written HIGH lasts exactly one tick.
    TickInput,
}

/// Evaluation phase a gate kind belongs to. Phases run in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Combinational,
    Reset,
    Hold,
    Junction,
}

impl Phase {
    pub fn index(self) -> usize {
        self as usize
    }
}

impl GateKind {
    /// Number of input port groups.
    pub fn input_groups(self) -> usize {
        match self {
            GateKind::None | GateKind::ConstantOn | GateKind::ConstantOff => 0,
            GateKind::TristateBuffer | GateKind::TristateBufferInverted => 2,
            _ => 1,
        }
    }

    /// Number of output port groups.
    pub fn output_groups(self) -> usize {
        match self {
            GateKind::None => 0,
            _ => 1,
        }
    }

    /// Whether an input group accepts more than one binding.
    pub fn accepts_fan_in(self, port: PortId) -> bool {
        match self {
            GateKind::TristateBuffer | GateKind::TristateBufferInverted | GateKind::Buffer => false,
            _ => (port as usize) < self.input_groups(),
        }
    }

    pub fn phase(self) -> Option<Phase> {
        match self {
            GateKind::None => None,
            GateKind::And
            | GateKind::Or
            | GateKind::Xor
            | GateKind::Nand
            | GateKind::Nor
            | GateKind::Xnor => Some(Phase::Combinational),
            GateKind::TickInput => Some(Phase::Reset),
            GateKind::TristateBuffer
            | GateKind::TristateBufferInverted
            | GateKind::ConstantOn
            | GateKind::ConstantOff
            | GateKind::CopySelfOutput
            | GateKind::Buffer => Some(Phase::Hold),
            GateKind::Junction => Some(Phase::Junction),
        }
    }

    /// True for the kinds whose output is the negation of their base function.
    pub fn is_inverted(self) -> bool {
        matches!(
            self,
            GateKind::Nand | GateKind::Nor | GateKind::Xnor | GateKind::TristateBufferInverted
        )
    }

    pub fn is_none(self) -> bool {
        self == GateKind::None
    }

    /// Output a gate holds after a reset or when it is first placed.
    ///
    /// The ideal model starts everything LOW. The realistic model starts
    /// combinational gates UNDEFINED and constants at their own value.
    pub fn reset_state(self, realistic: bool) -> LogicState {
        if !realistic {
            return LogicState::Low;
        }
        match self {
            GateKind::ConstantOn => LogicState::High,
            kind if kind.phase() == Some(Phase::Combinational) => LogicState::Undefined,
            _ => LogicState::Low,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reference to one end of a wire: a gate and one of its port groups.
///
/// Stored in a gate's input groups it names the driving gate and its output
/// port. Stored in a gate's output list it names the driven gate and the
/// input group it lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateConnection {
    pub gate: SimulatorId,
    pub port: PortId,
}

impl GateConnection {
    pub fn new(gate: SimulatorId, port: PortId) -> Self {
        Self { gate, port }
    }
}

/// AND family. `Low` short-circuits, then any unknown gives `Undefined`.
pub fn eval_and<I>(inputs: I, inverted: bool) -> LogicState
where
    I: IntoIterator<Item = LogicState>,
{
    let mut seen = false;
    let mut unknown = false;
    for state in inputs {
        seen = true;
        match state {
            LogicState::Low => return LogicState::from_bool(inverted),
            LogicState::High => {}
            LogicState::Floating | LogicState::Undefined => unknown = true,
        }
    }
    if !seen {
        LogicState::Low
    } else if unknown {
        LogicState::Undefined
    } else {
        LogicState::from_bool(!inverted)
    }
}

/// OR family. `High` short-circuits, then any unknown gives `Undefined`.
pub fn eval_or<I>(inputs: I, inverted: bool) -> LogicState
where
    I: IntoIterator<Item = LogicState>,
{
    let mut seen = false;
    let mut unknown = false;
    for state in inputs {
        seen = true;
        match state {
            LogicState::High => return LogicState::from_bool(!inverted),
            LogicState::Low => {}
            LogicState::Floating | LogicState::Undefined => unknown = true,
        }
    }
    if !seen {
        LogicState::Low
    } else if unknown {
        LogicState::Undefined
    } else {
        LogicState::from_bool(inverted)
    }
}

/// XOR family. Any unknown input gives `Undefined`, otherwise parity.
pub fn eval_xor<I>(inputs: I, inverted: bool) -> LogicState
where
    I: IntoIterator<Item = LogicState>,
{
    let mut seen = false;
    let mut parity = false;
    for state in inputs {
        seen = true;
        match state {
            LogicState::High => parity = !parity,
            LogicState::Low => {}
            LogicState::Floating | LogicState::Undefined => return LogicState::Undefined,
        }
    }
    if !seen {
        LogicState::Low
    } else {
        LogicState::from_bool(parity != inverted)
    }
}

/// Wire merge of every driver. No driven input leaves the wire `Floating`.
pub fn eval_junction<I>(inputs: I) -> LogicState
where
    I: IntoIterator<Item = LogicState>,
{
    let mut merged = LogicState::Floating;
    for state in inputs {
        merged = merged.join(state);
        if merged == LogicState::Undefined {
            break;
        }
    }
    merged
}

/// Tristate buffer. `None` means the port group has no driver.
pub fn eval_tristate(
    data: Option<LogicState>,
    control: Option<LogicState>,
    inverted: bool,
) -> LogicState {
    let enable = if inverted { LogicState::Low } else { LogicState::High };
    match control {
        None => LogicState::Undefined,
        Some(c) if c == enable => data.unwrap_or(LogicState::Undefined),
        Some(c) if c.is_driven() => LogicState::Floating,
        Some(_) => LogicState::Undefined,
    }
}

/// Realistic update of a combinational output.
///
/// A driven output that flips spends one tick UNDEFINED before it settles.
pub fn eval_realistic(previous: LogicState, computed: LogicState) -> LogicState {
    match (previous, computed) {
        (_, LogicState::Undefined) => LogicState::Undefined,
        (LogicState::Undefined, state) => state,
        (previous, state) if previous == state => state,
        _ => LogicState::Undefined,
    }
}

/// Evaluates a combinational kind over its single input group.
///
/// Returns `None` for kinds that are not combinational.
pub fn eval_combinational<I>(kind: GateKind, inputs: I) -> Option<LogicState>
where
    I: IntoIterator<Item = LogicState>,
{
    let state = match kind {
        GateKind::And => eval_and(inputs, false),
        GateKind::Nand => eval_and(inputs, true),
        GateKind::Or => eval_or(inputs, false),
        GateKind::Nor => eval_or(inputs, true),
        GateKind::Xor => eval_xor(inputs, false),
        GateKind::Xnor => eval_xor(inputs, true),
        _ => return None,
    };
    Some(state)
}
