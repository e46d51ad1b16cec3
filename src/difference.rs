//! Change-sets produced by the circuit model.
//!
//! A [`Difference`] is an ordered list of edits to one circuit. Order
//! matters: later connections refer to blocks placed earlier in the list.

use serde::{Deserialize, Serialize};

use crate::address::Position;
use crate::gate::GateKind;
use crate::substituter::SubstitutionRule;
use crate::types::{CircuitId, PortId};

/// Block orientation. Carried through for the model, unused by evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    Zero,
    Ninety,
    OneEighty,
    TwoSeventy,
}

/// Kind of a placed block, as the circuit model names it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Junction,
    TristateBuffer,
    TristateBufferInverted,
    Buffer,
    Constant,
    Button,
    Switch,
    TickButton,
    Light,
    /// Instance of another circuit.
    Custom(CircuitId),
}

/// How a block kind is simulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockGate {
    Fixed(GateKind),
    Substituted(SubstitutionRule),
    Circuit(CircuitId),
}

impl BlockKind {
    pub fn gate(self) -> BlockGate {
        match self {
            BlockKind::And => BlockGate::Fixed(GateKind::And),
            BlockKind::Or => BlockGate::Fixed(GateKind::Or),
            BlockKind::Xor => BlockGate::Fixed(GateKind::Xor),
            BlockKind::Nand => BlockGate::Fixed(GateKind::Nand),
            BlockKind::Nor => BlockGate::Fixed(GateKind::Nor),
            BlockKind::Xnor => BlockGate::Fixed(GateKind::Xnor),
            BlockKind::Junction | BlockKind::Light => BlockGate::Fixed(GateKind::Junction),
            BlockKind::TristateBuffer => BlockGate::Fixed(GateKind::TristateBuffer),
            BlockKind::TristateBufferInverted => BlockGate::Fixed(GateKind::TristateBufferInverted),
            BlockKind::Buffer => BlockGate::Fixed(GateKind::Buffer),
            BlockKind::Constant => BlockGate::Fixed(GateKind::ConstantOn),
            BlockKind::Button | BlockKind::Switch => BlockGate::Substituted(SubstitutionRule::DUMMY_INPUT),
            BlockKind::TickButton => BlockGate::Substituted(SubstitutionRule::TICK_INPUT),
            BlockKind::Custom(circuit) => BlockGate::Circuit(circuit),
        }
    }
}

/// A block port: the block's position and a port index on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub block: Position,
    #[serde(default)]
    pub port: PortId,
}

impl PortRef {
    pub fn new(block: Position, port: PortId) -> Self {
        Self { block, port }
    }
}

/// One recorded edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Modification {
    PlaceBlock {
        position: Position,
        #[serde(default)]
        rotation: Rotation,
        kind: BlockKind,
    },
    RemoveBlock {
        position: Position,
    },
    MoveBlock {
        from: Position,
        to: Position,
    },
    CreateConnection {
        output: PortRef,
        input: PortRef,
    },
    RemoveConnection {
        output: PortRef,
        input: PortRef,
    },
    SetData {
        position: Position,
        data: u32,
    },
}

/// Ordered list of modifications to one circuit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difference {
    modifications: Vec<Modification>,
}

impl Difference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, modification: Modification) {
        self.modifications.push(modification);
    }

    /// Appends every modification of `other`.
    pub fn extend(&mut self, other: &Difference) {
        self.modifications.extend(other.modifications.iter().cloned());
    }

    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Circuits instantiated by `custom` placements, in order.
    pub fn placed_circuits(&self) -> impl Iterator<Item = CircuitId> + '_ {
        self.modifications.iter().filter_map(|m| match m {
            Modification::PlaceBlock {
                kind: BlockKind::Custom(circuit),
                ..
            } => Some(*circuit),
            _ => None,
        })
    }

    // Builder helpers, mostly for tests and demos.

    pub fn place(mut self, position: impl Into<Position>, kind: BlockKind) -> Self {
        self.push(Modification::PlaceBlock {
            position: position.into(),
            rotation: Rotation::Zero,
            kind,
        });
        self
    }

    pub fn remove(mut self, position: impl Into<Position>) -> Self {
        self.push(Modification::RemoveBlock {
            position: position.into(),
        });
        self
    }

    pub fn move_block(mut self, from: impl Into<Position>, to: impl Into<Position>) -> Self {
        self.push(Modification::MoveBlock {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Wires output port 0 of `from` to input `port` of `to`.
    pub fn connect(mut self, from: impl Into<Position>, to: impl Into<Position>, port: PortId) -> Self {
        self.push(Modification::CreateConnection {
            output: PortRef::new(from.into(), 0),
            input: PortRef::new(to.into(), port),
        });
        self
    }

    /// Wires an explicit output port to an explicit input port.
    pub fn connect_ports(mut self, output: PortRef, input: PortRef) -> Self {
        self.push(Modification::CreateConnection { output, input });
        self
    }

    pub fn disconnect(mut self, from: impl Into<Position>, to: impl Into<Position>, port: PortId) -> Self {
        self.push(Modification::RemoveConnection {
            output: PortRef::new(from.into(), 0),
            input: PortRef::new(to.into(), port),
        });
        self
    }

    pub fn set_data(mut self, position: impl Into<Position>, data: u32) -> Self {
        self.push(Modification::SetData {
            position: position.into(),
            data,
        });
        self
    }
}

impl FromIterator<Modification> for Difference {
    fn from_iter<I: IntoIterator<Item = Modification>>(iter: I) -> Self {
        Self {
            modifications: iter.into_iter().collect(),
        }
    }
}
