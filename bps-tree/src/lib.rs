//! In-memory B+*-tree index.
//!
//! Layers, bottom up:
//!  - `storage`: extent allocation and the block arena
//!  - `btree`: blocks, search, insert/delete with neighbour rebalancing,
//!    bulk build, cursors and a structural self-check
//!  - `simulation`: seeded random workloads checked against a model
//!
//! The tree never installs a `tracing` subscriber; the stress binary does.

pub mod btree;
pub mod config;
pub mod simulation;
pub mod storage;

pub use btree::{Comparator, NaturalOrder, Tree, TreeError, TreeIterator};
pub use config::{ConfigError, SearchMode, TreeConfig};
