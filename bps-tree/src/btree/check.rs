//! Structural self-check, statistics and a debug dump.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::block::{Block, BlockId, InnerBlock, LeafBlock};
use super::order::Comparator;
use super::tree::Tree;
use crate::storage::ExtentAllocator;

/// Set of problems found by [`Tree::debug_check`]. Empty means healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckFlags(u32);

impl CheckFlags {
    /// Empty tree with leftover root, leaf links, depth or maximum.
    pub const EMPTY_TREE: Self = Self(0x1);
    /// Root missing or depth zero for a non-empty tree.
    pub const ROOT: Self = Self(0x2);
    /// Element count differs from `size()`.
    pub const SIZE: Self = Self(0x4);
    /// Stored maximum differs from the largest element.
    pub const MAX_ELEM: Self = Self(0x8);
    /// A garbage or missing block is reachable from the root.
    pub const BLOCK_KIND: Self = Self(0x10);
    /// Block counters or the garbage list disagree with the structure.
    pub const BLOCK_COUNT: Self = Self(0x20);
    /// Leaves are not all at depth `depth()`.
    pub const LEAF_LEVEL: Self = Self(0x100);
    /// A leaf is empty or over capacity.
    pub const LEAF_SIZE: Self = Self(0x200);
    /// Elements are not strictly increasing.
    pub const LEAF_ORDER: Self = Self(0x400);
    /// An inner block has a bad child or separator count.
    pub const INNER_SIZE: Self = Self(0x1000);
    /// Separators are not strictly increasing.
    pub const INNER_ORDER: Self = Self(0x2000);
    /// A separator differs from its child's maximum.
    pub const SEPARATOR: Self = Self(0x4000);
    /// A leaf's `next` link does not match key order.
    pub const LEAF_NEXT: Self = Self(0x1_0000);
    /// A leaf's `prev` link does not match key order.
    pub const LEAF_PREV: Self = Self(0x2_0000);
    /// The first leaf has a `prev` or the last leaf a `next`.
    pub const LEAF_LIST_END: Self = Self(0x4_0000);
    /// The stored first or last leaf is wrong.
    pub const LAST_LEAF: Self = Self(0x8_0000);

    const NAMES: [(Self, &'static str); 16] = [
        (Self::EMPTY_TREE, "empty-tree"),
        (Self::ROOT, "root"),
        (Self::SIZE, "size"),
        (Self::MAX_ELEM, "max-elem"),
        (Self::BLOCK_KIND, "block-kind"),
        (Self::BLOCK_COUNT, "block-count"),
        (Self::LEAF_LEVEL, "leaf-level"),
        (Self::LEAF_SIZE, "leaf-size"),
        (Self::LEAF_ORDER, "leaf-order"),
        (Self::INNER_SIZE, "inner-size"),
        (Self::INNER_ORDER, "inner-order"),
        (Self::SEPARATOR, "separator"),
        (Self::LEAF_NEXT, "leaf-next"),
        (Self::LEAF_PREV, "leaf-prev"),
        (Self::LEAF_LIST_END, "leaf-list-end"),
        (Self::LAST_LEAF, "last-leaf"),
    ];

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for CheckFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CheckFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for CheckFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ok");
        }
        let mut sep = "";
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                write!(f, "{sep}{name}")?;
                sep = "|";
            }
        }
        Ok(())
    }
}

/// Block and memory counters of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub size: usize,
    pub depth: usize,
    pub leaf_blocks: usize,
    pub inner_blocks: usize,
    pub garbage_blocks: usize,
    pub extents: usize,
    pub memory_used: usize,
}

/// State carried along the leaf list during a check.
struct Walk<E> {
    flags: CheckFlags,
    prev_leaf: BlockId,
    last_elem: Option<E>,
    elems: usize,
    leaves: usize,
    inners: usize,
}

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Verify every structural invariant.
    ///
    /// Returns the set of violated invariants; an empty set (`bits() == 0`)
    /// means the tree is consistent. Meant for tests and debugging: it walks
    /// every block.
    #[must_use]
    pub fn debug_check(&self) -> CheckFlags {
        let mut walk = Walk {
            flags: CheckFlags::empty(),
            prev_leaf: BlockId::INVALID,
            last_elem: None,
            elems: 0,
            leaves: 0,
            inners: 0,
        };

        if self.root.is_valid() {
            if self.depth == 0 {
                walk.flags |= CheckFlags::ROOT;
            }
            let max = self.check_block(self.root, 1, &mut walk);
            let max_matches = match (max, self.max_elem) {
                (Some(found), Some(stored)) => self.cmp.compare(&found, &stored) == Ordering::Equal,
                _ => false,
            };
            if !max_matches {
                walk.flags |= CheckFlags::MAX_ELEM;
            }
            if self.last != walk.prev_leaf {
                walk.flags |= CheckFlags::LAST_LEAF;
            }
            if self.leaf(self.last).is_some_and(|leaf| leaf.next.is_valid()) {
                walk.flags |= CheckFlags::LEAF_LIST_END;
            }
        } else if self.size != 0
            || self.depth != 0
            || self.first.is_valid()
            || self.last.is_valid()
            || self.max_elem.is_some()
        {
            walk.flags |= CheckFlags::EMPTY_TREE;
        }

        if walk.elems != self.size {
            walk.flags |= CheckFlags::SIZE;
        }
        if walk.leaves != self.leaf_count
            || walk.inners != self.inner_count
            || self.garbage_list_len() != Some(self.garbage_count)
        {
            walk.flags |= CheckFlags::BLOCK_COUNT;
        }
        walk.flags
    }

    /// Check the subtree under `id` at `level` (root is 1). Returns its maximum.
    fn check_block(&self, id: BlockId, level: usize, walk: &mut Walk<C::Elem>) -> Option<C::Elem> {
        match self.block(id) {
            Some(Block::Leaf(leaf)) => {
                self.check_leaf(id, leaf, level, walk);
                leaf.elems.last().copied()
            }
            Some(Block::Inner(inner)) => self.check_inner(inner, level, walk),
            Some(Block::Garbage(_)) | None => {
                walk.flags |= CheckFlags::BLOCK_KIND;
                None
            }
        }
    }

    fn check_leaf(&self, id: BlockId, leaf: &LeafBlock<C::Elem>, level: usize, walk: &mut Walk<C::Elem>) {
        walk.leaves += 1;
        walk.elems += leaf.elems.len();
        if level != self.depth {
            walk.flags |= CheckFlags::LEAF_LEVEL;
        }
        if leaf.elems.is_empty() || leaf.elems.len() > self.leaf_capacity {
            walk.flags |= CheckFlags::LEAF_SIZE;
        }
        for elem in &leaf.elems {
            if walk
                .last_elem
                .is_some_and(|before| self.cmp.compare(&before, elem) != Ordering::Less)
            {
                walk.flags |= CheckFlags::LEAF_ORDER;
            }
            walk.last_elem = Some(*elem);
        }

        if leaf.prev != walk.prev_leaf {
            walk.flags |= CheckFlags::LEAF_PREV;
        }
        match self.leaf(walk.prev_leaf) {
            Some(prev) if prev.next != id => walk.flags |= CheckFlags::LEAF_NEXT,
            Some(_) => {}
            None => {
                if self.first != id {
                    walk.flags |= CheckFlags::LAST_LEAF;
                }
                if leaf.prev.is_valid() {
                    walk.flags |= CheckFlags::LEAF_LIST_END;
                }
            }
        }
        walk.prev_leaf = id;
    }

    fn check_inner(
        &self,
        inner: &InnerBlock<C::Elem>,
        level: usize,
        walk: &mut Walk<C::Elem>,
    ) -> Option<C::Elem> {
        walk.inners += 1;
        if level >= self.depth {
            walk.flags |= CheckFlags::LEAF_LEVEL;
            return None;
        }
        let min_children = if level == 1 { 2 } else { 1 };
        let count = inner.children.len();
        if count < min_children
            || count > self.inner_capacity
            || inner.separators.len() + 1 != count
        {
            walk.flags |= CheckFlags::INNER_SIZE;
        }
        if inner
            .separators
            .windows(2)
            .any(|pair| self.cmp.compare(&pair[0], &pair[1]) != Ordering::Less)
        {
            walk.flags |= CheckFlags::INNER_ORDER;
        }

        let mut max = None;
        for (i, &child) in inner.children.iter().enumerate() {
            max = self.check_block(child, level + 1, walk);
            if let Some(separator) = inner.separator(i) {
                let matches = max
                    .is_some_and(|child_max| self.cmp.compare(&child_max, separator) == Ordering::Equal);
                if !matches {
                    walk.flags |= CheckFlags::SEPARATOR;
                }
            }
        }
        max
    }

    /// Length of the garbage list, or `None` if it is malformed.
    fn garbage_list_len(&self) -> Option<usize> {
        let mut len = 0;
        let mut id = self.garbage_head;
        while id.is_valid() {
            let Some(Block::Garbage(garbage)) = self.block(id) else {
                return None;
            };
            if garbage.id != id || len > self.arena.block_count() {
                return None;
            }
            len += 1;
            id = garbage.next;
        }
        Some(len)
    }

    /// Block and memory counters.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            size: self.size,
            depth: self.depth,
            leaf_blocks: self.leaf_count,
            inner_blocks: self.inner_count,
            garbage_blocks: self.garbage_count,
            extents: self.arena.extent_count(),
            memory_used: self.memory_used(),
        }
    }

    /// Render the block structure, one block per line, indented by level.
    #[must_use]
    pub const fn dump(&self) -> Dump<'_, C, A> {
        Dump { tree: self }
    }

    fn dump_block(&self, f: &mut fmt::Formatter<'_>, id: BlockId, level: usize) -> fmt::Result
    where
        C::Elem: fmt::Debug,
    {
        let indent = level * 2;
        match self.block(id) {
            Some(Block::Leaf(leaf)) => writeln!(f, "{:indent$}{id} leaf {:?}", "", leaf.elems),
            Some(Block::Inner(inner)) => {
                writeln!(f, "{:indent$}{id} inner separators {:?}", "", inner.separators)?;
                if level < self.depth {
                    for &child in &inner.children {
                        self.dump_block(f, child, level + 1)?;
                    }
                }
                Ok(())
            }
            Some(Block::Garbage(_)) => writeln!(f, "{:indent$}{id} garbage", ""),
            None => writeln!(f, "{:indent$}{id} missing", ""),
        }
    }
}

/// Display adapter returned by [`Tree::dump`].
pub struct Dump<'a, C: Comparator, A: ExtentAllocator> {
    tree: &'a Tree<C, A>,
}

impl<C, A> fmt::Display for Dump<'_, C, A>
where
    C: Comparator,
    C::Elem: fmt::Debug,
    A: ExtentAllocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree;
        writeln!(
            f,
            "tree size={} depth={} max={:?}",
            tree.size, tree.depth, tree.max_elem
        )?;
        if tree.root.is_valid() {
            tree.dump_block(f, tree.root, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::NaturalOrder;
    use crate::config::TreeConfig;

    fn tree_of(values: impl IntoIterator<Item = u64>) -> Tree<NaturalOrder<u64>> {
        let mut tree =
            Tree::with_config(NaturalOrder::new(), TreeConfig::default().with_capacities(2, 3))
                .expect("valid config");
        for value in values {
            tree.insert(value).expect("insert");
        }
        tree
    }

    #[test]
    fn test_flags_display() {
        assert_eq!(CheckFlags::empty().to_string(), "ok");
        assert_eq!((CheckFlags::SIZE | CheckFlags::LEAF_ORDER).to_string(), "size|leaf-order");
        let mut flags = CheckFlags::empty();
        flags.insert(CheckFlags::SEPARATOR);
        assert!(flags.contains(CheckFlags::SEPARATOR));
        assert!(!flags.contains(CheckFlags::SIZE));
        assert_eq!(flags.bits(), 0x4000);
    }

    #[test]
    fn test_healthy_trees_pass() {
        assert!(tree_of([]).debug_check().is_empty());
        assert!(tree_of([1]).debug_check().is_empty());
        assert_eq!(tree_of(0..100).debug_check(), CheckFlags::empty());
    }

    #[test]
    fn test_detects_size_mismatch() {
        let mut tree = tree_of(0..10);
        tree.size += 1;
        assert!(tree.debug_check().contains(CheckFlags::SIZE));
    }

    #[test]
    fn test_detects_unordered_leaf() {
        let mut tree = tree_of([10, 20, 30]);
        let first = tree.first;
        tree.leaf_mut(first).expect("leaf").elems.swap(0, 1);
        let flags = tree.debug_check();
        assert!(flags.contains(CheckFlags::LEAF_ORDER));
        assert!(flags.contains(CheckFlags::SEPARATOR));
    }

    #[test]
    fn test_detects_stale_maximum() {
        let mut tree = tree_of([10, 20, 30]);
        tree.max_elem = Some(99);
        assert!(tree.debug_check().contains(CheckFlags::MAX_ELEM));
    }

    #[test]
    fn test_detects_broken_leaf_link() {
        let mut tree = tree_of(0..10);
        let first = tree.first;
        tree.leaf_mut(first).expect("leaf").next = BlockId::INVALID;
        assert!(tree.debug_check().contains(CheckFlags::LEAF_NEXT));
    }

    #[test]
    fn test_stats_track_blocks() {
        let tree = tree_of([10, 20, 30]);
        let stats = tree.stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.depth, 2);
        assert_eq!(stats.leaf_blocks, 2);
        assert_eq!(stats.inner_blocks, 1);
        assert_eq!(stats.memory_used, tree.memory_used());
    }

    #[test]
    fn test_dump_renders_levels() {
        let tree = tree_of([10, 20, 30]);
        let dump = tree.dump().to_string();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "tree size=3 depth=2 max=Some(30)");
        assert!(lines[1].starts_with("  #") && lines[1].ends_with("inner separators [20]"));
        assert!(lines[2].starts_with("    #") && lines[2].ends_with("leaf [10, 20]"));
        assert!(lines[3].ends_with("leaf [30]"));
    }
}
