//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module provides tools for testing the tree with:
//! - Reproducible random operation sequences
//! - An extent allocator with fault injection
//! - Invariant checking against a model after each operation
//!
//! Given the same seed, execution is identical.
//!
//! # Usage
//!
//! ```
//! use bps_tree::simulation::{FaultConfig, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345)
//!     .with_key_space(512)
//!     .with_fault_config(FaultConfig::low_faults());
//!
//! let mut sim = Simulator::new(config);
//! let result = sim.run(500);
//!
//! assert!(result.invariant_violations.is_empty());
//! ```

mod invariants;
mod simulator;
mod storage;
mod workload;

pub use invariants::{InvariantChecker, InvariantViolation, Model};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
pub use storage::{FaultConfig, SimulatedAllocator};
pub use workload::{Operation, Record, RecordOrder, WorkloadConfig, WorkloadGenerator};
