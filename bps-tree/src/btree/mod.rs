//! The B+*-tree.
//!
//! Elements live in leaf blocks linked in key order; inner blocks route
//! searches by separators that copy their children's maxima. Blocks are
//! kept at least two thirds full by shifting entries to neighbours before
//! splitting (insert) and borrowing before merging (delete).
//!
//! # Usage
//!
//! ```
//! use bps_tree::btree::{NaturalOrder, Tree};
//!
//! let mut tree = Tree::new(NaturalOrder::<u64>::new());
//! tree.build(&[10, 20, 30]).expect("fresh pool has extents");
//! tree.insert(25).expect("fresh pool has extents");
//! assert!(tree.delete(&10));
//!
//! assert_eq!(tree.find(&25), Some(&25));
//! assert_eq!(tree.iter().copied().collect::<Vec<_>>(), vec![20, 25, 30]);
//! assert!(tree.debug_check().is_empty());
//! ```

mod block;
mod build;
mod check;
mod delete;
mod insert;
mod iter;
mod order;
mod path;
mod search;
mod tree;

pub use block::{Block, BlockId, BlockKind, GarbageBlock, InnerBlock, LeafBlock};
pub use check::{CheckFlags, Dump, TreeStats};
pub use iter::{Iter, RevIter, TreeIterator};
pub use order::{Comparator, NaturalOrder};
pub use tree::{Tree, TreeError};
