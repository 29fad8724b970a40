//! Main simulator harness for deterministic simulation testing.
//!
//! Ties the workload generator, the fault-injecting allocator and the
//! invariant checker together: every generated operation is applied to a
//! tree and to a `BTreeMap` model, and the two are compared afterwards.

use super::invariants::{InvariantChecker, InvariantViolation, Model};
use super::storage::{FaultConfig, SimulatedAllocator};
use super::workload::{Operation, Record, RecordOrder, WorkloadConfig, WorkloadGenerator};
use crate::btree::{Tree, TreeError, TreeIterator};
use crate::config::TreeConfig;

type SimTree = Tree<RecordOrder, SimulatedAllocator>;

/// How many records a parked cursor is followed after each operation.
const CURSOR_STEPS: usize = 8;

/// Configuration for the simulator.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Layout of the tree under test.
    pub tree_config: TreeConfig,
    /// Operation mix.
    pub workload: WorkloadConfig,
    /// Fault injection configuration.
    pub fault_config: FaultConfig,
    /// Full content checks run every this many operations (and after the last).
    pub check_interval: usize,
}

impl SimulatorConfig {
    /// Create a new simulator config with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tree_config: TreeConfig::default(),
            workload: WorkloadConfig::default(),
            fault_config: FaultConfig::default(),
            check_interval: 1,
        }
    }

    #[must_use]
    pub const fn with_tree_config(mut self, config: TreeConfig) -> Self {
        self.tree_config = config;
        self
    }

    #[must_use]
    pub const fn with_workload(mut self, config: WorkloadConfig) -> Self {
        self.workload = config;
        self
    }

    /// Set the fault configuration.
    #[must_use]
    pub const fn with_fault_config(mut self, config: FaultConfig) -> Self {
        self.fault_config = config;
        self
    }

    #[must_use]
    pub const fn with_key_space(mut self, key_space: u32) -> Self {
        self.workload.key_space = key_space;
        self
    }

    #[must_use]
    pub const fn with_check_interval(mut self, interval: usize) -> Self {
        self.check_interval = interval;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    pub operations_run: u64,
    pub inserts: u64,
    pub replacements: u64,
    pub deletes: u64,
    pub lookups: u64,
    pub rebuilds: u64,
    /// Operations refused because the allocator had no extent.
    pub allocation_failures: u64,
    /// Elements in the tree at the end.
    pub final_size: usize,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether the simulation ran to the end.
    pub completed_successfully: bool,
    /// Error message if the simulation could not start.
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully && self.invariant_violations.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    operations_run: u64,
    inserts: u64,
    replacements: u64,
    deletes: u64,
    lookups: u64,
    rebuilds: u64,
    allocation_failures: u64,
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    workload: WorkloadGenerator,
    checker: InvariantChecker,
    counters: Counters,
}

impl Simulator {
    /// Create a new simulator with the given configuration.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            workload: WorkloadGenerator::with_config(config.seed, config.workload),
            config,
            checker: InvariantChecker::new(),
            counters: Counters::default(),
        }
    }

    /// Run the simulation for a given number of operations.
    ///
    /// Starts from an empty tree and checks invariants after each operation.
    pub fn run(&mut self, operation_count: usize) -> SimulationResult {
        let allocator = SimulatedAllocator::with_config(self.config.seed, self.config.fault_config);
        let mut tree = match Tree::with_allocator(RecordOrder, self.config.tree_config, allocator) {
            Ok(tree) => tree,
            Err(err) => return self.result(0, false, Some(err.to_string())),
        };
        let mut model = Model::new();
        let mut cursor: Option<TreeIterator> = None;
        let interval = self.config.check_interval.max(1);

        for index in 0..operation_count {
            let operation = self.workload.next_operation();
            self.apply(&mut tree, &mut model, &mut cursor, operation, index);
            self.counters.operations_run += 1;

            if index % interval == 0 || index + 1 == operation_count {
                self.checker.check_structure(&tree, index);
                self.checker.check_contents(&tree, &model, index);
            }
            if let Some(cursor) = cursor {
                self.checker
                    .check_cursor(&tree, &model, cursor, CURSOR_STEPS, index);
            }
        }

        tracing::debug!(
            seed = self.config.seed,
            operations = operation_count,
            size = tree.size(),
            depth = tree.depth(),
            violations = self.checker.violations().len(),
            "simulation finished"
        );
        self.result(tree.size(), true, None)
    }

    fn apply(
        &mut self,
        tree: &mut SimTree,
        model: &mut Model,
        cursor: &mut Option<TreeIterator>,
        operation: Operation,
        index: usize,
    ) {
        match operation {
            Operation::Insert(record) => self.apply_insert(tree, model, record, index),
            Operation::Delete(key) => {
                self.counters.deletes += 1;
                let removed = tree.delete(&Record { key, value: 0 });
                if removed != model.remove(&key).is_some() {
                    self.checker.add_violation(
                        "Delete result differs from model",
                        index,
                        format!("key {key}: tree removed {removed}"),
                    );
                }
            }
            Operation::Lookup(key) => {
                self.counters.lookups += 1;
                self.checker.check_lookups(tree, model, &[key], index);
                let sample = tree.random(self.workload.random_word()).copied();
                match sample {
                    Some(record) if model.get(&record.key) != Some(&record.value) => {
                        self.checker
                            .add_violation("Random sample not in model", index, format!("{record:?}"));
                    }
                    None if !model.is_empty() => {
                        self.checker
                            .add_violation("Random sample missing", index, String::new());
                    }
                    _ => {}
                }
            }
            Operation::Seek(key) => {
                let (mut it, exact) = tree.lower_bound(&key);
                let found = tree.get(&mut it).map(|record| record.key);
                let wanted = model.range(key..).next().map(|(&k, _)| k);
                if found != wanted || exact != model.contains_key(&key) {
                    self.checker.add_violation(
                        "Lower bound differs from model",
                        index,
                        format!("key {key}: tree {found:?} (exact {exact}), model {wanted:?}"),
                    );
                }
                *cursor = Some(it);
            }
            Operation::Rebuild => self.apply_rebuild(tree, model, index),
        }
    }

    fn apply_insert(&mut self, tree: &mut SimTree, model: &mut Model, record: Record, index: usize) {
        match tree.insert(record) {
            Ok(Some(old)) => {
                self.counters.replacements += 1;
                if model.get(&record.key) != Some(&old.value) {
                    self.checker.add_violation(
                        "Replaced record differs from model",
                        index,
                        format!("{old:?} replaced by {record:?}"),
                    );
                }
                model.insert(record.key, record.value);
            }
            Ok(None) => {
                self.counters.inserts += 1;
                if let Some(value) = model.insert(record.key, record.value) {
                    self.checker.add_violation(
                        "Insert missed an existing record",
                        index,
                        format!("key {} already held {value}", record.key),
                    );
                }
            }
            Err(TreeError::OutOfExtents) => {
                self.counters.allocation_failures += 1;
                // The failed insert must be invisible.
                self.checker.check_lookups(tree, model, &[record.key], index);
            }
        }
    }

    fn apply_rebuild(&mut self, tree: &mut SimTree, model: &Model, index: usize) {
        self.counters.rebuilds += 1;
        let records: Vec<Record> = model
            .iter()
            .map(|(&key, &value)| Record { key, value })
            .collect();
        let allocator = SimulatedAllocator::with_config(
            self.config.seed.wrapping_add(self.counters.rebuilds),
            self.config.fault_config,
        );
        let mut fresh = match Tree::with_allocator(RecordOrder, self.config.tree_config, allocator) {
            Ok(fresh) => fresh,
            Err(err) => {
                self.checker
                    .add_violation("Rebuild could not create a tree", index, err.to_string());
                return;
            }
        };
        match fresh.build(&records) {
            Ok(()) => *tree = fresh,
            Err(TreeError::OutOfExtents) => {
                self.counters.allocation_failures += 1;
                if !fresh.is_empty() {
                    self.checker.add_violation(
                        "Failed build left elements behind",
                        index,
                        format!("size {}", fresh.size()),
                    );
                }
            }
        }
    }

    fn result(&self, final_size: usize, completed: bool, error: Option<String>) -> SimulationResult {
        let counters = self.counters;
        SimulationResult {
            seed: self.config.seed,
            operations_run: counters.operations_run,
            inserts: counters.inserts,
            replacements: counters.replacements,
            deletes: counters.deletes,
            lookups: counters.lookups,
            rebuilds: counters.rebuilds,
            allocation_failures: counters.allocation_failures,
            final_size,
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully: completed,
            error,
        }
    }

    /// Get the invariant checker.
    #[must_use]
    pub const fn checker(&self) -> &InvariantChecker {
        &self.checker
    }
}
