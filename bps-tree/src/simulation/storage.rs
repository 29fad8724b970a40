//! Extent allocator with fault injection for deterministic testing.
//!
//! Wraps an [`ExtentPool`] and refuses allocations either at random, with a
//! seeded probability, or once a hard extent limit is reached. Both make
//! the tree walk its allocation-failure paths.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{ExtentAllocator, ExtentId, ExtentPool};

/// Configuration for fault injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultConfig {
    /// Probability of refusing an extent allocation (0.0 - 1.0).
    pub allocation_failure_rate: f64,
    /// Hard cap on live extents.
    pub extent_limit: Option<u32>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::no_faults()
    }
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub const fn no_faults() -> Self {
        Self {
            allocation_failure_rate: 0.0,
            extent_limit: None,
        }
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            allocation_failure_rate: 0.001,
            extent_limit: None,
        }
    }

    /// Create a fault config with high fault rates (for extreme testing).
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            allocation_failure_rate: 0.05,
            extent_limit: None,
        }
    }

    /// Cap the number of live extents.
    #[must_use]
    pub const fn with_extent_limit(mut self, limit: u32) -> Self {
        self.extent_limit = Some(limit);
        self
    }
}

/// Extent allocator that fails on demand.
#[derive(Debug)]
pub struct SimulatedAllocator {
    pool: ExtentPool,
    rng: StdRng,
    failure_rate: f64,
    injected_failures: u64,
}

impl SimulatedAllocator {
    /// Create an allocator whose random failures are driven by `seed`.
    #[must_use]
    pub fn with_config(seed: u64, config: FaultConfig) -> Self {
        let pool = config
            .extent_limit
            .map_or_else(ExtentPool::unbounded, ExtentPool::bounded);
        Self {
            pool,
            rng: StdRng::seed_from_u64(seed),
            failure_rate: config.allocation_failure_rate.clamp(0.0, 1.0),
            injected_failures: 0,
        }
    }

    /// Number of allocations refused at random.
    #[must_use]
    pub const fn injected_failures(&self) -> u64 {
        self.injected_failures
    }

    /// Number of extents currently handed out.
    #[must_use]
    pub const fn allocated_count(&self) -> u32 {
        self.pool.allocated_count()
    }
}

impl ExtentAllocator for SimulatedAllocator {
    fn allocate(&mut self) -> Option<ExtentId> {
        if self.failure_rate > 0.0 && self.rng.random_bool(self.failure_rate) {
            self.injected_failures += 1;
            return None;
        }
        self.pool.allocate()
    }

    fn free(&mut self, id: ExtentId) {
        self.pool.free(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_faults_always_allocates() {
        let mut allocator = SimulatedAllocator::with_config(1, FaultConfig::no_faults());
        for _ in 0..100 {
            assert!(allocator.allocate().is_some());
        }
        assert_eq!(allocator.injected_failures(), 0);
        assert_eq!(allocator.allocated_count(), 100);
    }

    #[test]
    fn test_certain_failure() {
        let config = FaultConfig {
            allocation_failure_rate: 1.0,
            extent_limit: None,
        };
        let mut allocator = SimulatedAllocator::with_config(1, config);
        assert_eq!(allocator.allocate(), None);
        assert_eq!(allocator.injected_failures(), 1);
        assert_eq!(allocator.allocated_count(), 0);
    }

    #[test]
    fn test_extent_limit() {
        let config = FaultConfig::no_faults().with_extent_limit(2);
        let mut allocator = SimulatedAllocator::with_config(1, config);
        let first = allocator.allocate().expect("first extent");
        assert!(allocator.allocate().is_some());
        assert_eq!(allocator.allocate(), None);

        allocator.free(first);
        assert!(allocator.allocate().is_some());
        assert_eq!(allocator.injected_failures(), 0);
    }

    #[test]
    fn test_failures_are_reproducible() {
        let pattern = |seed| {
            let mut allocator = SimulatedAllocator::with_config(seed, FaultConfig::high_faults());
            (0..200).map(|_| allocator.allocate().is_some()).collect::<Vec<_>>()
        };
        assert_eq!(pattern(7), pattern(7));
    }
}
