//! Cursors over the leaf list.
//!
//! A [`TreeIterator`] is a plain `(block, position)` value. It holds no
//! borrow of the tree, so it survives mutations; every use re-validates it
//! against the current tree and turns it invalid if the block is no longer
//! a leaf or the position fell out of range.

use std::iter::FusedIterator;

use super::block::{BlockId, LeafBlock};
use super::order::Comparator;
use super::search;
use super::tree::Tree;
use crate::config::SearchMode;
use crate::storage::ExtentAllocator;

/// In-leaf position of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    At(usize),
    /// The last element of whatever the leaf holds when the cursor is used.
    Last,
}

/// A cursor into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeIterator {
    block: BlockId,
    pos: Position,
}

impl TreeIterator {
    /// The exhausted cursor.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            block: BlockId::INVALID,
            pos: Position::At(0),
        }
    }

    /// Whether the cursor points nowhere.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        !self.block.is_valid()
    }

    /// Leaf the cursor points into.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    const fn at(block: BlockId, pos: usize) -> Self {
        Self {
            block,
            pos: Position::At(pos),
        }
    }
}

impl Default for TreeIterator {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Cursor at the smallest element.
    #[must_use]
    pub const fn first(&self) -> TreeIterator {
        if self.first.is_valid() {
            TreeIterator::at(self.first, 0)
        } else {
            TreeIterator::invalid()
        }
    }

    /// Cursor at the largest element.
    #[must_use]
    pub const fn last(&self) -> TreeIterator {
        TreeIterator {
            block: self.last,
            pos: Position::Last,
        }
    }

    /// Cursor at the first element not less than `key`, and whether it equals `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &C::Key) -> (TreeIterator, bool) {
        self.descend(key, search::lower_bound_key::<C>)
    }

    /// Cursor at the first element greater than `key`, and whether an
    /// element equal to `key` is stored.
    #[must_use]
    pub fn upper_bound(&self, key: &C::Key) -> (TreeIterator, bool) {
        self.descend(key, search::upper_bound_key::<C>)
    }

    fn descend(
        &self,
        key: &C::Key,
        bound: impl Fn(&C, &[C::Elem], &C::Key, SearchMode) -> (usize, bool),
    ) -> (TreeIterator, bool) {
        let mut id = self.root;
        let mut exact = false;
        loop {
            let Some(block) = self.block(id) else {
                return (TreeIterator::invalid(), exact);
            };
            if let Some(inner) = block.as_inner() {
                let (pos, found) = bound(&self.cmp, &inner.separators, key, self.config.search);
                exact |= found;
                match inner.children.get(pos) {
                    Some(&child) => id = child,
                    None => return (TreeIterator::invalid(), exact),
                }
                continue;
            }
            let Some(leaf) = block.as_leaf() else {
                return (TreeIterator::invalid(), exact);
            };
            let (pos, found) = bound(&self.cmp, &leaf.elems, key, self.config.search);
            exact |= found;
            let it = if pos < leaf.elems.len() {
                TreeIterator::at(id, pos)
            } else if leaf.next.is_valid() {
                TreeIterator::at(leaf.next, 0)
            } else {
                TreeIterator::invalid()
            };
            return (it, exact);
        }
    }

    /// Resolve a cursor to its leaf and position, if it is still valid.
    fn resolve(&self, it: &TreeIterator) -> Option<(&LeafBlock<C::Elem>, usize)> {
        let leaf = self.leaf(it.block)?;
        let pos = match it.pos {
            Position::At(pos) => pos,
            Position::Last => leaf.elems.len().checked_sub(1)?,
        };
        (pos < leaf.elems.len()).then_some((leaf, pos))
    }

    /// Element under the cursor. A stale cursor is invalidated and yields
    /// `None`; a cursor from [`Tree::last`] is pinned to the position it
    /// resolved to.
    pub fn get(&self, it: &mut TreeIterator) -> Option<&C::Elem> {
        match self.resolve(it) {
            Some((leaf, pos)) => {
                it.pos = Position::At(pos);
                leaf.elems.get(pos)
            }
            None => {
                *it = TreeIterator::invalid();
                None
            }
        }
    }

    /// Step forward. Returns `false` once the cursor runs off the end or is
    /// found stale; an invalid cursor restarts at [`Tree::first`].
    pub fn next(&self, it: &mut TreeIterator) -> bool {
        if it.is_invalid() {
            *it = self.first();
            return !it.is_invalid();
        }
        let stepped = self.resolve(it).and_then(|(leaf, pos)| {
            if pos + 1 < leaf.elems.len() {
                Some(TreeIterator::at(it.block, pos + 1))
            } else {
                leaf.next.is_valid().then_some(TreeIterator::at(leaf.next, 0))
            }
        });
        *it = stepped.unwrap_or_default();
        !it.is_invalid()
    }

    /// Step backward. Returns `false` once the cursor runs off the start or
    /// is found stale; an invalid cursor restarts at [`Tree::last`].
    pub fn prev(&self, it: &mut TreeIterator) -> bool {
        if it.is_invalid() {
            *it = self.last();
            return !it.is_invalid();
        }
        let stepped = self.resolve(it).and_then(|(leaf, pos)| match pos.checked_sub(1) {
            Some(before) => Some(TreeIterator::at(it.block, before)),
            None => {
                let last = self.leaf(leaf.prev)?.elems.len().checked_sub(1)?;
                Some(TreeIterator::at(leaf.prev, last))
            }
        });
        *it = stepped.unwrap_or_default();
        !it.is_invalid()
    }

    /// Check if two cursors point at the same place.
    ///
    /// Two invalid cursors are equal. A cursor at the last position is
    /// resolved before comparing.
    #[must_use]
    pub fn iterators_equal(&self, a: &TreeIterator, b: &TreeIterator) -> bool {
        match (a.is_invalid(), b.is_invalid()) {
            (true, true) => true,
            (false, false) if a.block == b.block => {
                let pos_a = self.resolve(a).map(|(_, pos)| pos);
                let pos_b = self.resolve(b).map(|(_, pos)| pos);
                (pos_a.is_some() && pos_a == pos_b) || a.pos == b.pos
            }
            _ => false,
        }
    }

    /// Iterate all elements in ascending order.
    #[must_use]
    pub const fn iter(&self) -> Iter<'_, C, A> {
        Iter {
            tree: self,
            cursor: self.first(),
        }
    }

    /// Iterate all elements in descending order.
    #[must_use]
    pub const fn iter_rev(&self) -> RevIter<'_, C, A> {
        RevIter {
            tree: self,
            cursor: self.last(),
        }
    }

    /// Iterate in ascending order from the first element not less than `key`.
    #[must_use]
    pub fn range_from(&self, key: &C::Key) -> Iter<'_, C, A> {
        Iter {
            tree: self,
            cursor: self.lower_bound(key).0,
        }
    }
}

/// Ascending iterator over a tree.
pub struct Iter<'a, C: Comparator, A: ExtentAllocator> {
    tree: &'a Tree<C, A>,
    cursor: TreeIterator,
}

impl<'a, C: Comparator, A: ExtentAllocator> Iterator for Iter<'a, C, A> {
    type Item = &'a C::Elem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_invalid() {
            return None;
        }
        let elem = self.tree.get(&mut self.cursor)?;
        self.tree.next(&mut self.cursor);
        Some(elem)
    }
}

impl<C: Comparator, A: ExtentAllocator> FusedIterator for Iter<'_, C, A> {}

/// Descending iterator over a tree.
pub struct RevIter<'a, C: Comparator, A: ExtentAllocator> {
    tree: &'a Tree<C, A>,
    cursor: TreeIterator,
}

impl<'a, C: Comparator, A: ExtentAllocator> Iterator for RevIter<'a, C, A> {
    type Item = &'a C::Elem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_invalid() {
            return None;
        }
        let elem = self.tree.get(&mut self.cursor)?;
        self.tree.prev(&mut self.cursor);
        Some(elem)
    }
}

impl<C: Comparator, A: ExtentAllocator> FusedIterator for RevIter<'_, C, A> {}

impl<'a, C: Comparator, A: ExtentAllocator> IntoIterator for &'a Tree<C, A> {
    type Item = &'a C::Elem;
    type IntoIter = Iter<'a, C, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::btree::NaturalOrder;
    use crate::config::TreeConfig;

    fn tree_of(values: impl IntoIterator<Item = u64>) -> Tree<NaturalOrder<u64>> {
        let mut tree =
            Tree::with_config(NaturalOrder::new(), TreeConfig::default().with_capacities(3, 3))
                .expect("valid config");
        for value in values {
            tree.insert(value).expect("insert");
        }
        tree
    }

    #[test]
    fn test_empty_tree_cursors() {
        let tree = tree_of([]);
        let mut it = tree.first();
        assert!(it.is_invalid());
        assert!(tree.last().is_invalid());
        assert_eq!(tree.get(&mut it), None);
        assert!(!tree.next(&mut it));
        assert!(!tree.prev(&mut it));
        assert_eq!(tree.lower_bound(&5), (TreeIterator::invalid(), false));
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn test_walk_forward_and_backward() {
        let tree = tree_of(0..40);
        let mut it = tree.first();
        let mut forward = Vec::new();
        while let Some(&value) = tree.get(&mut it) {
            forward.push(value);
            tree.next(&mut it);
        }
        assert_eq!(forward, (0..40).collect::<Vec<_>>());
        assert!(it.is_invalid());

        let mut it = tree.last();
        let mut backward = Vec::new();
        while let Some(&value) = tree.get(&mut it) {
            backward.push(value);
            tree.prev(&mut it);
        }
        assert_eq!(backward, (0..40).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_invalid_cursor_restarts() {
        let tree = tree_of(0..10);
        let mut it = TreeIterator::invalid();
        assert!(tree.next(&mut it));
        assert_eq!(tree.get(&mut it), Some(&0));

        let mut it = TreeIterator::default();
        assert!(tree.prev(&mut it));
        assert_eq!(tree.get(&mut it), Some(&9));
    }

    #[test]
    fn test_last_cursor_stays_put_after_get() {
        let mut tree = Tree::new(NaturalOrder::<u64>::new());
        for value in [10, 20, 30] {
            tree.insert(value).expect("insert");
        }
        let mut it = tree.last();
        assert_eq!(tree.get(&mut it), Some(&30));

        tree.insert(40).expect("insert");
        assert_eq!(tree.get(&mut it), Some(&30));
        assert!(tree.next(&mut it));
        assert_eq!(tree.get(&mut it), Some(&40));
    }

    #[test]
    fn test_prev_into_previous_leaf_is_positioned() {
        let tree = tree_of(0..9);
        let mut it = tree.first();
        let first_leaf = it.block();
        while it.block() == first_leaf {
            assert!(tree.next(&mut it));
        }
        assert!(tree.prev(&mut it));
        assert_eq!(it.block(), first_leaf);
        assert!(matches!(it.pos, Position::At(_)));
        assert_eq!(tree.get(&mut it), tree.leaf(first_leaf).and_then(|leaf| leaf.elems.last()));
    }

    #[test]
    fn test_lower_and_upper_bound() {
        let tree = tree_of((0..50).map(|v| v * 10));

        let (mut it, exact) = tree.lower_bound(&120);
        assert!(exact);
        assert_eq!(tree.get(&mut it), Some(&120));

        let (mut it, exact) = tree.lower_bound(&125);
        assert!(!exact);
        assert_eq!(tree.get(&mut it), Some(&130));

        let (mut it, exact) = tree.upper_bound(&120);
        assert!(exact);
        assert_eq!(tree.get(&mut it), Some(&130));

        let (mut it, exact) = tree.upper_bound(&125);
        assert!(!exact);
        assert_eq!(tree.get(&mut it), Some(&130));

        let (it, exact) = tree.lower_bound(&1_000);
        assert!(!exact);
        assert!(it.is_invalid());

        let (it, exact) = tree.upper_bound(&490);
        assert!(exact);
        assert!(it.is_invalid());
    }

    #[test]
    fn test_upper_bound_reports_match_in_previous_leaf() {
        let tree = tree_of((0..50).map(|v| v * 10));
        // Every leaf maximum is also a separator; each must still report exactness.
        let mut it = tree.first();
        while let Some(&value) = tree.get(&mut it) {
            let (_, exact) = tree.upper_bound(&value);
            assert!(exact, "upper_bound({value}) lost the match");
            tree.next(&mut it);
        }
    }

    #[test]
    fn test_iterators_equal() {
        let tree = tree_of(0..20);
        let last = tree.last();
        let (at_max, _) = tree.lower_bound(&19);
        assert!(tree.iterators_equal(&last, &at_max));
        assert!(tree.iterators_equal(&TreeIterator::invalid(), &TreeIterator::default()));
        assert!(!tree.iterators_equal(&tree.first(), &TreeIterator::invalid()));
        assert!(!tree.iterators_equal(&tree.first(), &last));
    }

    #[test]
    fn test_iterator_adapters() {
        let tree = tree_of([5, 1, 9, 3, 7]);
        assert_eq!(tree.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
        assert_eq!(tree.iter_rev().copied().collect::<Vec<_>>(), vec![9, 7, 5, 3, 1]);
        assert_eq!(tree.range_from(&4).copied().collect::<Vec<_>>(), vec![5, 7, 9]);
        assert_eq!((&tree).into_iter().count(), 5);
    }

    #[test]
    fn test_replace_keeps_cursor_valid() {
        let mut tree = tree_of(0..30);
        let (mut it, _) = tree.lower_bound(&17);
        tree.insert(17).expect("replace");
        assert_eq!(tree.get(&mut it), Some(&17));
        assert!(tree.next(&mut it));
        assert_eq!(tree.get(&mut it), Some(&18));
    }

    #[test]
    fn test_stale_cursor_never_yields_foreign_elements() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut tree = tree_of((0..300).map(|v| v * 2));
        let mut model: std::collections::BTreeSet<u64> = (0..300).map(|v| v * 2).collect();

        for round in 0..200 {
            let start = rng.random_range(0..600u64);
            let (mut it, _) = tree.lower_bound(&start);
            for _ in 0..5 {
                let value = rng.random_range(0..600u64);
                if rng.random_bool(0.5) {
                    tree.insert(value).expect("insert");
                    model.insert(value);
                } else {
                    tree.delete(&value);
                    model.remove(&value);
                }
            }
            for _ in 0..10 {
                match tree.get(&mut it) {
                    Some(value) => assert!(model.contains(value), "round {round} yielded {value}"),
                    None => assert!(it.is_invalid()),
                }
                if !tree.next(&mut it) {
                    break;
                }
            }
        }
        assert_eq!(tree.debug_check().bits(), 0);
    }
}
