//! Invariant checking for deterministic simulation testing.
//!
//! After every operation the tree is compared against a `BTreeMap` model
//! that received the same operations.

use std::collections::BTreeMap;

use super::workload::{Record, RecordOrder};
use crate::btree::{Tree, TreeIterator};
use crate::storage::ExtentAllocator;

/// The reference model: key to payload.
pub type Model = BTreeMap<u32, u32>;

/// An invariant violation detected during simulation.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Operation index where it was detected.
    pub operation_index: usize,
    /// Additional context.
    pub context: String,
}

/// Checker for tree invariants.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
}

impl InvariantChecker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    /// Get all violations.
    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Add a violation.
    pub fn add_violation(&mut self, description: &str, operation_index: usize, context: String) {
        self.violations.push(InvariantViolation {
            description: description.to_string(),
            operation_index,
            context,
        });
    }

    /// The tree's own structural self-check must come back clean.
    pub fn check_structure<A: ExtentAllocator>(
        &mut self,
        tree: &Tree<RecordOrder, A>,
        operation_index: usize,
    ) {
        let flags = tree.debug_check();
        if !flags.is_empty() {
            self.add_violation(
                "Structural check failed",
                operation_index,
                format!("flags: {flags} ({:#x})", flags.bits()),
            );
        }
    }

    /// Size and in-order contents must match the model.
    pub fn check_contents<A: ExtentAllocator>(
        &mut self,
        tree: &Tree<RecordOrder, A>,
        model: &Model,
        operation_index: usize,
    ) {
        if tree.size() != model.len() {
            self.add_violation(
                "Size mismatch",
                operation_index,
                format!("tree: {}, model: {}", tree.size(), model.len()),
            );
        }

        let expected = model.iter().map(|(&key, &value)| Record { key, value });
        if let Some((position, (found, wanted))) = tree
            .iter()
            .copied()
            .zip(expected)
            .enumerate()
            .find(|(_, (found, wanted))| found != wanted)
        {
            self.add_violation(
                "Iteration differs from model",
                operation_index,
                format!("position {position}: tree {found:?}, model {wanted:?}"),
            );
        }
    }

    /// Lookups of `keys` must agree with the model.
    pub fn check_lookups<A: ExtentAllocator>(
        &mut self,
        tree: &Tree<RecordOrder, A>,
        model: &Model,
        keys: &[u32],
        operation_index: usize,
    ) {
        for &key in keys {
            let found = tree.find(&key).map(|record| record.value);
            let wanted = model.get(&key).copied();
            if found != wanted {
                self.add_violation(
                    "Lookup differs from model",
                    operation_index,
                    format!("key {key}: tree {found:?}, model {wanted:?}"),
                );
            }
        }
    }

    /// A possibly stale cursor may go invalid, but anything it yields must be
    /// live and in ascending order.
    pub fn check_cursor<A: ExtentAllocator>(
        &mut self,
        tree: &Tree<RecordOrder, A>,
        model: &Model,
        cursor: TreeIterator,
        steps: usize,
        operation_index: usize,
    ) {
        let mut cursor = cursor;
        let mut previous: Option<u32> = None;
        for _ in 0..steps {
            let Some(&record) = tree.get(&mut cursor) else {
                return;
            };
            if model.get(&record.key) != Some(&record.value) {
                self.add_violation(
                    "Cursor yielded a record not in the model",
                    operation_index,
                    format!("{record:?}"),
                );
                return;
            }
            if previous.is_some_and(|key| key >= record.key) {
                self.add_violation(
                    "Cursor went out of order",
                    operation_index,
                    format!("{previous:?} then {}", record.key),
                );
                return;
            }
            previous = Some(record.key);
            if !tree.next(&mut cursor) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;

    fn tree_from(model: &Model) -> Tree<RecordOrder> {
        let mut tree = Tree::with_config(RecordOrder, TreeConfig::default().with_capacities(3, 3))
            .expect("valid config");
        for (&key, &value) in model {
            tree.insert(Record { key, value }).expect("insert");
        }
        tree
    }

    #[test]
    fn test_matching_tree_has_no_violations() {
        let model: Model = (0..50).map(|k| (k, k * 10)).collect();
        let tree = tree_from(&model);
        let mut checker = InvariantChecker::new();
        checker.check_structure(&tree, 0);
        checker.check_contents(&tree, &model, 0);
        checker.check_lookups(&tree, &model, &[0, 7, 49, 50], 0);
        checker.check_cursor(&tree, &model, tree.first(), 100, 0);
        assert!(!checker.has_violations(), "{:?}", checker.violations());
    }

    #[test]
    fn test_detects_content_mismatch() {
        let model: Model = (0..10).map(|k| (k, k)).collect();
        let tree = tree_from(&model);
        let mut other = model.clone();
        other.insert(3, 99);
        other.insert(20, 20);

        let mut checker = InvariantChecker::new();
        checker.check_contents(&tree, &other, 5);
        checker.check_lookups(&tree, &other, &[3], 5);
        let descriptions: Vec<&str> = checker
            .violations()
            .iter()
            .map(|v| v.description.as_str())
            .collect();
        assert_eq!(
            descriptions,
            vec!["Size mismatch", "Iteration differs from model", "Lookup differs from model"]
        );
        assert!(checker.violations().iter().all(|v| v.operation_index == 5));
    }

    #[test]
    fn test_detects_foreign_cursor_record() {
        let model: Model = (0..10).map(|k| (k, k)).collect();
        let tree = tree_from(&model);
        let mut stale = model.clone();
        stale.remove(&0);

        let mut checker = InvariantChecker::new();
        checker.check_cursor(&tree, &stale, tree.first(), 5, 1);
        assert!(checker.has_violations());
    }
}
