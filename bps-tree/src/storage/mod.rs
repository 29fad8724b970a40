//! Memory layer of the tree.
//!
//! Blocks are fixed-size slots carved out of larger extents:
//!
//! - An [`ExtentAllocator`] hands out extent ids and takes them back.
//! - A [`BlockArena`] maps block ids onto slots inside those extents.
//!
//! # Usage
//!
//! ```
//! use bps_tree::storage::{BlockArena, ExtentPool};
//!
//! // Four blocks per extent, at most two extents.
//! let mut arena = BlockArena::new(ExtentPool::bounded(2), 4);
//!
//! let id = arena.alloc("block").expect("first extent is available");
//! assert_eq!(arena.get(id), Some(&"block"));
//! assert_eq!(arena.extent_count(), 1);
//! ```

mod allocator;
mod arena;

pub use allocator::{ExtentAllocator, ExtentId, ExtentPool};
pub use arena::BlockArena;
