//! Block positions and nested addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid position of a block inside one circuit. Doubles as the block's key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Path of block positions from the root circuit down through nested
/// integrated circuits. The last element names the block itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(Vec<Position>);

impl Address {
    /// The empty address, naming the root circuit.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(path: Vec<Position>) -> Self {
        Self(path)
    }

    /// Address of a block placed directly in the root circuit.
    pub fn of(position: Position) -> Self {
        Self(vec![position])
    }

    /// Appends a position, descending one level.
    pub fn with(&self, position: Position) -> Self {
        let mut path = self.0.clone();
        path.push(position);
        Self(path)
    }

    pub fn push(&mut self, position: Position) {
        self.0.push(position);
    }

    /// Concatenates `suffix` below this address.
    pub fn join(&self, suffix: &Address) -> Self {
        let mut path = self.0.clone();
        path.extend_from_slice(&suffix.0);
        Self(path)
    }

    /// Address of the containing circuit, `None` for the root.
    pub fn parent(&self) -> Option<Address> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.to_vec()))
    }

    pub fn last(&self) -> Option<Position> {
        self.0.last().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn positions(&self) -> &[Position] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &Address) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<Position> for Address {
    fn from(position: Position) -> Self {
        Self::of(position)
    }
}

impl From<Vec<Position>> for Address {
    fn from(path: Vec<Position>) -> Self {
        Self(path)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for position in &self.0 {
            write!(f, "/{position}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting() {
        let ic = Address::of(Position::new(3, 4));
        let inner = ic.with(Position::new(0, 1));
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.parent(), Some(ic.clone()));
        assert_eq!(inner.last(), Some(Position::new(0, 1)));
        assert!(inner.starts_with(&ic));
        assert_eq!(Address::root().parent(), None);
    }

    #[test]
    fn test_join() {
        let origin = Address::of(Position::new(1, 1));
        let relative = Address::new(vec![Position::new(2, 2), Position::new(3, 3)]);
        let joined = origin.join(&relative);
        assert_eq!(joined.positions().len(), 3);
        assert_eq!(joined.to_string(), "/(1, 1)/(2, 2)/(3, 3)");
        assert_eq!(Address::root().to_string(), "/");
    }

    #[test]
    fn test_serde_is_a_plain_list() {
        let address = Address::from(Position::new(5, -2));
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, r#"[{"x":5,"y":-2}]"#);
    }
}
