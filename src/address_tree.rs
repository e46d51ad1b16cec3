//! Address to value mapping for nested circuits.
//!
//! Each node stands for one circuit instance and keys its entries by block
//! position. An entry is either a leaf value (a plain block) or a branch (an
//! integrated-circuit block with its own node). Nodes live in an arena and
//! refer to each other by index.

use std::collections::HashMap;
use thiserror::Error;

use crate::address::{Address, Position};
use crate::types::CircuitId;

/// Errors raised when inserting into an [`AddressTree`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressTreeError {
    #[error("address {0} is already occupied")]
    Occupied(Address),

    #[error("no circuit instance contains {0}")]
    MissingParent(Address),

    #[error("nothing is stored at {0}")]
    NotFound(Address),

    #[error("the root address names a circuit, not a block")]
    RootAddress,
}

pub type AddressTreeResult<T> = Result<T, AddressTreeError>;

const ROOT: usize = 0;

#[derive(Clone, Debug)]
struct TreeNode<T> {
    container: CircuitId,
    values: HashMap<Position, T>,
    branches: HashMap<Position, usize>,
}

impl<T> TreeNode<T> {
    fn new(container: CircuitId) -> Self {
        Self {
            container,
            values: HashMap::new(),
            branches: HashMap::new(),
        }
    }

    fn is_free(&self, key: &Position) -> bool {
        !self.values.contains_key(key) && !self.branches.contains_key(key)
    }
}

/// Tree of circuit instances mapping block addresses to values.
///
/// A key is never a leaf and a branch at the same node.
#[derive(Clone, Debug)]
pub struct AddressTree<T> {
    nodes: Vec<Option<TreeNode<T>>>,
    free: Vec<usize>,
}

impl<T: Clone> AddressTree<T> {
    /// Creates a tree whose root node is an instance of `root_container`.
    pub fn new(root_container: CircuitId) -> Self {
        Self {
            nodes: vec![Some(TreeNode::new(root_container))],
            free: Vec::new(),
        }
    }

    pub fn root_container(&self) -> CircuitId {
        self.nodes[ROOT].as_ref().map_or(0, |node| node.container)
    }

    fn node(&self, index: usize) -> Option<&TreeNode<T>> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut TreeNode<T>> {
        self.nodes.get_mut(index).and_then(Option::as_mut)
    }

    /// Index of the node reached by following `path` through branches.
    fn find_node(&self, path: &[Position]) -> Option<usize> {
        let mut index = ROOT;
        for position in path {
            index = *self.node(index)?.branches.get(position)?;
        }
        Some(index)
    }

    /// Node holding the last element of `address`, and that element.
    fn locate(&self, address: &Address) -> Option<(usize, Position)> {
        let (last, parent) = address.positions().split_last()?;
        Some((self.find_node(parent)?, *last))
    }

    fn locate_for_insert(&self, address: &Address) -> AddressTreeResult<(usize, Position)> {
        let (last, parent) = address
            .positions()
            .split_last()
            .ok_or(AddressTreeError::RootAddress)?;
        let index = self
            .find_node(parent)
            .ok_or_else(|| AddressTreeError::MissingParent(address.clone()))?;
        Ok((index, *last))
    }

    /// Stores `value` at `address`. The containing circuit must exist.
    pub fn add_value(&mut self, address: &Address, value: T) -> AddressTreeResult<()> {
        let (index, key) = self.locate_for_insert(address)?;
        let node = self
            .node_mut(index)
            .ok_or_else(|| AddressTreeError::MissingParent(address.clone()))?;
        if !node.is_free(&key) {
            return Err(AddressTreeError::Occupied(address.clone()));
        }
        node.values.insert(key, value);
        Ok(())
    }

    /// Creates an empty circuit instance of `container` at `address`.
    pub fn make_branch(&mut self, address: &Address, container: CircuitId) -> AddressTreeResult<()> {
        let (parent, key) = self.locate_for_insert(address)?;
        if !self.node(parent).is_some_and(|node| node.is_free(&key)) {
            return Err(AddressTreeError::Occupied(address.clone()));
        }

        let child = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(TreeNode::new(container));
                index
            }
            None => {
                self.nodes.push(Some(TreeNode::new(container)));
                self.nodes.len() - 1
            }
        };
        if let Some(node) = self.node_mut(parent) {
            node.branches.insert(key, child);
        }
        Ok(())
    }

    /// Value at `address`, `None` if any segment is missing.
    pub fn get(&self, address: &Address) -> Option<&T> {
        let (index, key) = self.locate(address)?;
        self.node(index)?.values.get(&key)
    }

    pub fn contains_value(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn contains_branch(&self, address: &Address) -> bool {
        !address.is_empty() && self.find_node(address.positions()).is_some()
    }

    /// Circuit instantiated at `address`. The root address gives the root circuit.
    pub fn container_of(&self, address: &Address) -> Option<CircuitId> {
        self.node(self.find_node(address.positions())?)
            .map(|node| node.container)
    }

    /// Circuits instantiated along `address`, root first.
    ///
    /// Stops at the first segment that is not a branch.
    pub fn containers_along(&self, address: &Address) -> Vec<CircuitId> {
        let mut containers = vec![self.root_container()];
        let mut index = ROOT;
        for position in address.positions() {
            match self.node(index).and_then(|node| node.branches.get(position)) {
                Some(&child) => {
                    index = child;
                    if let Some(node) = self.node(child) {
                        containers.push(node.container);
                    }
                }
                None => break,
            }
        }
        containers
    }

    pub fn remove_value(&mut self, address: &Address) -> Option<T> {
        let (index, key) = self.locate(address)?;
        self.node_mut(index)?.values.remove(&key)
    }

    /// Removes the circuit instance at `address` and everything below it.
    ///
    /// Returns every leaf value that was removed.
    pub fn remove_branch(&mut self, address: &Address) -> Option<Vec<T>> {
        let (parent, key) = self.locate(address)?;
        let child = self.node_mut(parent)?.branches.remove(&key)?;

        let mut removed = Vec::new();
        let mut stack = vec![child];
        while let Some(index) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(index).and_then(Option::take) {
                removed.extend(node.values.into_values());
                stack.extend(node.branches.into_values());
                self.free.push(index);
            }
        }
        Some(removed)
    }

    /// Moves the entry at `from` to `to` inside the circuit instance at `parent`.
    pub fn move_entry(&mut self, parent: &Address, from: Position, to: Position) -> AddressTreeResult<()> {
        let index = self
            .find_node(parent.positions())
            .ok_or_else(|| AddressTreeError::MissingParent(parent.with(from)))?;
        let node = self
            .node_mut(index)
            .ok_or_else(|| AddressTreeError::MissingParent(parent.with(from)))?;
        if from == to {
            return Ok(());
        }
        if !node.is_free(&to) {
            return Err(AddressTreeError::Occupied(parent.with(to)));
        }
        if let Some(value) = node.values.remove(&from) {
            node.values.insert(to, value);
        } else if let Some(child) = node.branches.remove(&from) {
            node.branches.insert(to, child);
        } else {
            return Err(AddressTreeError::NotFound(parent.with(from)));
        }
        Ok(())
    }

    /// Prefix addresses of every instance of `container`, the root included.
    pub fn addresses_of_container(&self, container: CircuitId) -> Vec<Address> {
        let mut found = Vec::new();
        let mut stack = vec![(ROOT, Address::root())];
        while let Some((index, address)) = stack.pop() {
            let Some(node) = self.node(index) else {
                continue;
            };
            if node.container == container {
                found.push(address.clone());
            }
            for (&position, &child) in &node.branches {
                stack.push((child, address.with(position)));
            }
        }
        found.sort();
        found
    }

    /// Values removing `address` would drop: the leaf there, or every leaf
    /// below the circuit instance there. `None` if nothing is stored.
    pub fn values_at(&self, address: &Address) -> Option<Vec<T>> {
        if let Some(value) = self.get(address) {
            return Some(vec![value.clone()]);
        }
        if address.is_empty() {
            return None;
        }
        let mut found = Vec::new();
        let mut stack = vec![self.find_node(address.positions())?];
        while let Some(index) = stack.pop() {
            if let Some(node) = self.node(index) {
                found.extend(node.values.values().cloned());
                stack.extend(node.branches.values().copied());
            }
        }
        Some(found)
    }

    /// Number of leaf values in the whole tree.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().map(|node| node.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: i32, y: i32) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn test_add_and_get() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        let address = Address::of(pos(1, 2));
        tree.add_value(&address, 7).unwrap();
        assert_eq!(tree.get(&address), Some(&7));
        assert_eq!(tree.get(&Address::of(pos(0, 0))), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_key_is_leaf_or_branch() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        let address = Address::of(pos(1, 1));
        tree.add_value(&address, 1).unwrap();
        assert_eq!(
            tree.make_branch(&address, 5),
            Err(AddressTreeError::Occupied(address.clone()))
        );
        assert_eq!(tree.add_value(&address, 2), Err(AddressTreeError::Occupied(address)));

        let ic = Address::of(pos(2, 2));
        tree.make_branch(&ic, 5).unwrap();
        assert_eq!(tree.add_value(&ic, 3), Err(AddressTreeError::Occupied(ic.clone())));
        assert!(tree.contains_branch(&ic));
        assert!(!tree.contains_value(&ic));
    }

    #[test]
    fn test_missing_intermediate_segment() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        let deep = Address::new(vec![pos(9, 9), pos(0, 0)]);
        assert_eq!(tree.get(&deep), None);
        assert_eq!(
            tree.add_value(&deep, 1),
            Err(AddressTreeError::MissingParent(deep.clone()))
        );
        assert_eq!(tree.add_value(&Address::root(), 1), Err(AddressTreeError::RootAddress));
    }

    #[test]
    fn test_nested_branches() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        let outer = Address::of(pos(1, 0));
        let inner = outer.with(pos(2, 0));
        tree.make_branch(&outer, 10).unwrap();
        tree.make_branch(&inner, 20).unwrap();
        tree.add_value(&outer.with(pos(0, 0)), 1).unwrap();
        tree.add_value(&inner.with(pos(0, 0)), 2).unwrap();

        assert_eq!(tree.get(&inner.with(pos(0, 0))), Some(&2));
        assert_eq!(tree.container_of(&inner), Some(20));
        assert_eq!(tree.container_of(&Address::root()), Some(0));
        assert_eq!(tree.containers_along(&inner.with(pos(0, 0))), vec![0, 10, 20]);
    }

    #[test]
    fn test_remove_branch_returns_all_values() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        let outer = Address::of(pos(1, 0));
        let inner = outer.with(pos(2, 0));
        tree.make_branch(&outer, 10).unwrap();
        tree.make_branch(&inner, 20).unwrap();
        tree.add_value(&outer.with(pos(0, 0)), 1).unwrap();
        tree.add_value(&inner.with(pos(0, 0)), 2).unwrap();
        tree.add_value(&Address::of(pos(5, 5)), 3).unwrap();

        let mut removed = tree.remove_branch(&outer).unwrap();
        removed.sort();
        assert_eq!(removed, vec![1, 2]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&inner.with(pos(0, 0))), None);
        assert_eq!(tree.remove_branch(&outer), None);

        // Freed nodes are reused.
        tree.make_branch(&outer, 30).unwrap();
        assert_eq!(tree.nodes.len(), 3);
    }

    #[test]
    fn test_remove_value() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        let address = Address::of(pos(1, 1));
        tree.add_value(&address, 4).unwrap();
        assert_eq!(tree.remove_value(&address), Some(4));
        assert_eq!(tree.remove_value(&address), None);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_move_entry() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        tree.add_value(&Address::of(pos(0, 0)), 1).unwrap();
        tree.add_value(&Address::of(pos(1, 0)), 2).unwrap();
        tree.make_branch(&Address::of(pos(2, 0)), 7).unwrap();

        tree.move_entry(&Address::root(), pos(0, 0), pos(0, 5)).unwrap();
        assert_eq!(tree.get(&Address::of(pos(0, 5))), Some(&1));
        assert_eq!(
            tree.move_entry(&Address::root(), pos(0, 5), pos(1, 0)),
            Err(AddressTreeError::Occupied(Address::of(pos(1, 0))))
        );
        tree.move_entry(&Address::root(), pos(2, 0), pos(3, 0)).unwrap();
        assert_eq!(tree.container_of(&Address::of(pos(3, 0))), Some(7));
    }

    #[test]
    fn test_addresses_of_container() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        tree.make_branch(&Address::of(pos(1, 0)), 5).unwrap();
        tree.make_branch(&Address::of(pos(2, 0)), 5).unwrap();
        tree.make_branch(&Address::of(pos(2, 0)).with(pos(0, 0)), 5).unwrap();

        let found = tree.addresses_of_container(5);
        assert_eq!(found.len(), 3);
        assert!(found.contains(&Address::new(vec![pos(2, 0), pos(0, 0)])));
        assert_eq!(tree.addresses_of_container(0), vec![Address::root()]);
    }

    #[test]
    fn test_values_at() {
        let mut tree: AddressTree<u32> = AddressTree::new(0);
        tree.add_value(&Address::of(pos(0, 0)), 4).unwrap();
        let ic = Address::of(pos(1, 0));
        tree.make_branch(&ic, 5).unwrap();
        tree.add_value(&ic.with(pos(0, 0)), 7).unwrap();
        tree.make_branch(&ic.with(pos(1, 0)), 6).unwrap();
        tree.add_value(&ic.with(pos(1, 0)).with(pos(0, 0)), 9).unwrap();

        assert_eq!(tree.values_at(&Address::of(pos(0, 0))), Some(vec![4]));
        let mut below = tree.values_at(&ic).unwrap();
        below.sort_unstable();
        assert_eq!(below, vec![7, 9]);
        assert_eq!(tree.values_at(&Address::of(pos(3, 3))), None);
        assert_eq!(tree.values_at(&Address::root()), None);

        // Looking is not removing.
        assert_eq!(tree.len(), 3);
        assert!(tree.contains_branch(&ic));
    }
}
