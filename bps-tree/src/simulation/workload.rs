//! Operation generator for deterministic simulation testing.
//!
//! Produces random but reproducible operation sequences over a small key
//! space, so inserts regularly hit existing keys and deletes regularly hit
//! present ones.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::btree::Comparator;

/// Element stored by the simulation: a key and a payload that replacement changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub key: u32,
    pub value: u32,
}

/// Orders records by key only; the payload does not take part.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordOrder;

impl Comparator for RecordOrder {
    type Elem = Record;
    type Key = u32;

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        a.key.cmp(&b.key)
    }

    fn compare_key(&self, elem: &Record, key: &u32) -> Ordering {
        elem.key.cmp(key)
    }
}

/// A single simulated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Insert a record, replacing one with the same key.
    Insert(Record),
    /// Delete the record with this key.
    Delete(u32),
    /// Point lookup.
    Lookup(u32),
    /// Park a cursor at the first key not below this one; it is checked after later mutations.
    Seek(u32),
    /// Throw the tree away and bulk-build a new one from the current contents.
    Rebuild,
}

/// Relative weights of the generated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub insert_weight: u32,
    pub delete_weight: u32,
    pub lookup_weight: u32,
    pub seek_weight: u32,
    pub rebuild_weight: u32,
    /// Keys are drawn from `0..key_space`.
    pub key_space: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            insert_weight: 50,
            delete_weight: 35,
            lookup_weight: 8,
            seek_weight: 5,
            rebuild_weight: 2,
            key_space: 4096,
        }
    }
}

impl WorkloadConfig {
    const fn total_weight(&self) -> u32 {
        self.insert_weight + self.delete_weight + self.lookup_weight + self.seek_weight + self.rebuild_weight
    }
}

/// Generator for random [`Operation`]s.
///
/// Deterministic for a given seed.
pub struct WorkloadGenerator {
    rng: StdRng,
    config: WorkloadConfig,
}

impl WorkloadGenerator {
    /// Create a generator with the default mix.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, WorkloadConfig::default())
    }

    /// Create a generator with a custom mix.
    #[must_use]
    pub fn with_config(seed: u64, config: WorkloadConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Generate the next operation.
    pub fn next_operation(&mut self) -> Operation {
        let config = self.config;
        let total = config.total_weight();
        if total == 0 {
            return Operation::Lookup(self.random_key());
        }
        let mut roll = self.rng.random_range(0..total);
        if roll < config.insert_weight {
            return Operation::Insert(Record {
                key: self.random_key(),
                value: self.rng.random(),
            });
        }
        roll -= config.insert_weight;
        if roll < config.delete_weight {
            return Operation::Delete(self.random_key());
        }
        roll -= config.delete_weight;
        if roll < config.lookup_weight {
            return Operation::Lookup(self.random_key());
        }
        roll -= config.lookup_weight;
        if roll < config.seek_weight {
            return Operation::Seek(self.random_key());
        }
        Operation::Rebuild
    }

    /// A random key in the configured key space.
    pub fn random_key(&mut self) -> u32 {
        self.rng.random_range(0..self.config.key_space.max(1))
    }

    /// A random word for [`crate::btree::Tree::random`].
    pub fn random_word(&mut self) -> usize {
        self.rng.random_range(0..=usize::MAX)
    }
}
