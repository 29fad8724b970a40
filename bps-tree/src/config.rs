//! Tree configuration module.
//!
//! This module provides the construction-time layout of a tree and loading
//! of that layout from environment variables.
//!
//! # Environment Variables
//!
//! - `BPS_TREE_BLOCK_SIZE`: Byte size of one block (default: `512`)
//! - `BPS_TREE_EXTENT_SIZE`: Byte size of one extent (default: `16384`)
//! - `BPS_TREE_LINEAR_SEARCH`: Use linear in-block search (default: `false`)
//! - `BPS_STRESS_SEED`: Seed of the stress workload (default: `42`)
//! - `BPS_STRESS_OPERATIONS`: Length of the stress workload (default: `100000`)
//!
//! # Invariants
//!
//! - `block_size` and `extent_size` are powers of two
//! - `extent_size >= block_size`, so every extent holds at least one block
//! - derived leaf capacity is at least 2 and inner capacity at least 3

use std::mem::size_of;

/// Bytes of block header: element count and block type.
const BLOCK_HEADER_SIZE: usize = 4;

/// Bytes of one stored block id.
const BLOCK_ID_SIZE: usize = 4;

/// How a block is searched for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Binary search over the block contents.
    #[default]
    Binary,
    /// Front-to-back scan; cheaper for tiny blocks.
    Linear,
}

/// Layout of a tree.
///
/// Capacities are derived from the block size and the element size unless
/// they are overridden explicitly with [`TreeConfig::with_capacities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Byte size of one block.
    pub block_size: usize,
    /// Byte size of one extent handed out by the extent allocator.
    pub extent_size: usize,
    /// In-block search strategy.
    pub search: SearchMode,
    /// Explicit leaf capacity, overriding the derived one.
    pub leaf_capacity: Option<usize>,
    /// Explicit inner capacity (children per inner block), overriding the derived one.
    pub inner_capacity: Option<usize>,
}

/// Error returned when a configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            extent_size: Self::DEFAULT_EXTENT_SIZE,
            search: SearchMode::Binary,
            leaf_capacity: None,
            inner_capacity: None,
        }
    }
}

impl TreeConfig {
    /// Default block size in bytes.
    pub const DEFAULT_BLOCK_SIZE: usize = 512;
    /// Default extent size in bytes.
    pub const DEFAULT_EXTENT_SIZE: usize = 16 * 1024;
    /// Smallest accepted block size.
    pub const MIN_BLOCK_SIZE: usize = 64;
    /// Smallest leaf capacity the rebalancing rules work with.
    pub const MIN_LEAF_CAPACITY: usize = 2;
    /// Smallest inner capacity the rebalancing rules work with.
    pub const MIN_INNER_CAPACITY: usize = 3;

    /// Set the block size.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the extent size.
    #[must_use]
    pub const fn with_extent_size(mut self, extent_size: usize) -> Self {
        self.extent_size = extent_size;
        self
    }

    /// Set the in-block search strategy.
    #[must_use]
    pub const fn with_search(mut self, search: SearchMode) -> Self {
        self.search = search;
        self
    }

    /// Override the derived block capacities.
    #[must_use]
    pub const fn with_capacities(mut self, leaf: usize, inner: usize) -> Self {
        self.leaf_capacity = Some(leaf);
        self.inner_capacity = Some(inner);
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `block_size` is not a power of two or is below `MIN_BLOCK_SIZE`
    /// - `extent_size` is not a power of two or is smaller than `block_size`
    /// - an explicit capacity is below its minimum
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.block_size.is_power_of_two() || self.block_size < Self::MIN_BLOCK_SIZE {
            return Err(invalid(
                "block_size",
                format!(
                    "{} must be a power of two of at least {}",
                    self.block_size,
                    Self::MIN_BLOCK_SIZE
                ),
            ));
        }
        if !self.extent_size.is_power_of_two() || self.extent_size < self.block_size {
            return Err(invalid(
                "extent_size",
                format!(
                    "{} must be a power of two of at least the block size {}",
                    self.extent_size, self.block_size
                ),
            ));
        }
        if let Some(leaf) = self.leaf_capacity.filter(|&c| c < Self::MIN_LEAF_CAPACITY) {
            return Err(invalid(
                "leaf_capacity",
                format!("{leaf} is below {}", Self::MIN_LEAF_CAPACITY),
            ));
        }
        if let Some(inner) = self.inner_capacity.filter(|&c| c < Self::MIN_INNER_CAPACITY) {
            return Err(invalid(
                "inner_capacity",
                format!("{inner} is below {}", Self::MIN_INNER_CAPACITY),
            ));
        }
        Ok(())
    }

    /// Number of elements a leaf of `E` holds.
    ///
    /// A leaf spends its header and two sibling links; the rest holds elements.
    #[must_use]
    pub fn leaf_capacity_for<E>(&self) -> usize {
        self.leaf_capacity
            .unwrap_or_else(|| {
                self.block_size
                    .saturating_sub(BLOCK_HEADER_SIZE + 2 * BLOCK_ID_SIZE)
                    / size_of::<E>().max(1)
            })
            .max(Self::MIN_LEAF_CAPACITY)
    }

    /// Number of children an inner block of `E` holds.
    #[must_use]
    pub fn inner_capacity_for<E>(&self) -> usize {
        self.inner_capacity
            .unwrap_or_else(|| {
                self.block_size.saturating_sub(BLOCK_HEADER_SIZE)
                    / (size_of::<E>() + BLOCK_ID_SIZE)
            })
            .max(Self::MIN_INNER_CAPACITY)
    }

    /// Number of blocks carved out of one extent.
    #[must_use]
    pub const fn blocks_per_extent(&self) -> usize {
        if self.block_size == 0 {
            return 1;
        }
        let count = self.extent_size / self.block_size;
        if count == 0 { 1 } else { count }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BPS_TREE_BLOCK_SIZE`: Block size (default: `512`)
    /// - `BPS_TREE_EXTENT_SIZE`: Extent size (default: `16384`)
    /// - `BPS_TREE_LINEAR_SEARCH`: `true`/`1` for linear search (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse, or if the
    /// resulting configuration fails [`TreeConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let block_size = load_number(&lookup, "BPS_TREE_BLOCK_SIZE", Self::DEFAULT_BLOCK_SIZE)?;
        let extent_size = load_number(&lookup, "BPS_TREE_EXTENT_SIZE", Self::DEFAULT_EXTENT_SIZE)?;
        let search = if load_flag(&lookup, "BPS_TREE_LINEAR_SEARCH")? {
            SearchMode::Linear
        } else {
            SearchMode::Binary
        };

        let config = Self {
            block_size,
            extent_size,
            search,
            leaf_capacity: None,
            inner_capacity: None,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings of the stress binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Seed of the random workload.
    pub seed: u64,
    /// Number of operations to run.
    pub operations: usize,
    /// Layout of the tree under test.
    pub tree: TreeConfig,
}

impl StressConfig {
    /// Default workload seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Default workload length.
    pub const DEFAULT_OPERATIONS: usize = 100_000;

    /// Load the stress settings and the tree layout from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the stress settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let seed = load_number(&lookup, "BPS_STRESS_SEED", Self::DEFAULT_SEED)?;
        let operations = load_number(&lookup, "BPS_STRESS_OPERATIONS", Self::DEFAULT_OPERATIONS)?;
        let tree = TreeConfig::from_lookup(lookup)?;
        Ok(Self {
            seed,
            operations,
            tree,
        })
    }
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}

/// Load a number, returning the default if the variable is not set.
fn load_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| invalid(name, format!("'{value}' is not a valid number"))),
        None => Ok(default),
    }
}

/// Load a boolean flag, `false` if the variable is not set.
fn load_flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<bool, ConfigError> {
    match lookup(name).as_deref().map(str::trim) {
        None | Some("" | "0" | "false") => Ok(false),
        Some("1" | "true") => Ok(true),
        Some(other) => Err(invalid(name, format!("'{other}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = TreeConfig::default();
        assert_eq!(config.block_size, 512);
        assert_eq!(config.extent_size, 16 * 1024);
        assert_eq!(config.search, SearchMode::Binary);
        assert!(config.validate().is_ok());
        assert_eq!(config.blocks_per_extent(), 32);
    }

    #[test]
    fn test_derived_capacities() {
        let config = TreeConfig::default();
        // (512 - 4 - 8) / 8 and (512 - 4) / (8 + 4)
        assert_eq!(config.leaf_capacity_for::<u64>(), 62);
        assert_eq!(config.inner_capacity_for::<u64>(), 42);
        assert_eq!(config.leaf_capacity_for::<u32>(), 125);
        assert_eq!(config.inner_capacity_for::<u32>(), 63);
    }

    #[test]
    fn test_capacities_never_drop_below_minimum() {
        let config = TreeConfig::default().with_block_size(64);
        assert_eq!(config.leaf_capacity_for::<[u8; 256]>(), 2);
        assert_eq!(config.inner_capacity_for::<[u8; 256]>(), 3);
    }

    #[test]
    fn test_capacity_override() {
        let config = TreeConfig::default().with_capacities(2, 3);
        assert_eq!(config.leaf_capacity_for::<u64>(), 2);
        assert_eq!(config.inner_capacity_for::<u64>(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        assert!(TreeConfig::default().with_block_size(500).validate().is_err());
        assert!(TreeConfig::default().with_block_size(32).validate().is_err());
        assert!(
            TreeConfig::default()
                .with_block_size(1024)
                .with_extent_size(512)
                .validate()
                .is_err()
        );
        assert!(TreeConfig::default().with_capacities(1, 3).validate().is_err());
        assert!(TreeConfig::default().with_capacities(2, 2).validate().is_err());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = TreeConfig::from_lookup(lookup_from(&[])).expect("defaults are valid");
        assert_eq!(config, TreeConfig::default());
    }

    #[test]
    fn test_from_lookup_values() {
        let config = TreeConfig::from_lookup(lookup_from(&[
            ("BPS_TREE_BLOCK_SIZE", "256"),
            ("BPS_TREE_EXTENT_SIZE", "4096"),
            ("BPS_TREE_LINEAR_SEARCH", "true"),
        ]))
        .expect("valid config");
        assert_eq!(config.block_size, 256);
        assert_eq!(config.extent_size, 4096);
        assert_eq!(config.search, SearchMode::Linear);
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let error = TreeConfig::from_lookup(lookup_from(&[("BPS_TREE_BLOCK_SIZE", "big")]))
            .expect_err("should reject");
        assert_eq!(
            error.to_string(),
            "invalid value for BPS_TREE_BLOCK_SIZE: 'big' is not a valid number"
        );
    }

    #[test]
    fn test_from_lookup_invalid_flag() {
        let result = TreeConfig::from_lookup(lookup_from(&[("BPS_TREE_LINEAR_SEARCH", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_stress_config_from_lookup() {
        let config = StressConfig::from_lookup(lookup_from(&[
            ("BPS_STRESS_SEED", "7"),
            ("BPS_STRESS_OPERATIONS", "1000"),
        ]))
        .expect("valid config");
        assert_eq!(config.seed, 7);
        assert_eq!(config.operations, 1000);
        assert_eq!(config.tree, TreeConfig::default());
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
