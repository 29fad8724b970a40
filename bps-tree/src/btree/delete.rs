//! Deletion.
//!
//! A block that drops below 2/3 occupancy borrows from a neighbour with
//! surplus, possibly through the near neighbour from the one beyond it. When
//! nobody has surplus the block hands its remaining entries to its
//! neighbours and is removed from its parent. If the neighbours cannot take
//! them, the block is simply left under-filled.

use super::block::BlockId;
use super::order::Comparator;
use super::path::PathElem;
use super::tree::Tree;
use crate::storage::ExtentAllocator;

/// Result of removing an entry from one level.
enum Outcome {
    Done,
    /// The block lost all entries and has been disposed; its parent entry must go.
    Emptied,
}

/// Entries a block should hold to count as filled: two thirds of `capacity`, rounded up.
const fn min_fill(capacity: usize) -> usize {
    (2 * capacity + 2) / 3
}

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Delete the element equal to `elem`.
    ///
    /// Returns `false` if no such element is stored. Deletion never allocates.
    pub fn delete(&mut self, elem: &C::Elem) -> bool {
        let Some((path, true)) = self.collect_path(elem) else {
            return false;
        };
        self.size -= 1;

        let leaf_index = path.len() - 1;
        let mut index = leaf_index;
        let mut remove_at = path[leaf_index].insertion_point;
        while matches!(
            self.delete_from(&path, index, remove_at, index == leaf_index),
            Outcome::Emptied
        ) {
            let current = path[index];
            let Some(parent) = current.parent else {
                break;
            };
            remove_at = current.pos_in_parent;
            index = parent;
        }
        true
    }

    /// Remove entry `pos` from the block at `path[index]` and rebalance.
    #[allow(clippy::too_many_lines)] // One arm per neighbour layout
    fn delete_from(&mut self, path: &[PathElem], index: usize, pos: usize, at_leaf: bool) -> Outcome {
        let current = path[index];
        let mut target = self.stage(current.block, current.slot);
        if pos < target.len() {
            target.entries.remove(pos);
        }
        let size = target.len();

        if current.parent.is_none() {
            self.shrink_root(target.entries.first().map(|entry| (entry.child, entry.value)), size, at_leaf);
            if size > 1 || (at_leaf && size == 1) {
                self.store(&target);
            }
            return Outcome::Done;
        }

        let cap = if at_leaf {
            self.leaf_capacity
        } else {
            self.inner_capacity
        };
        let min = min_fill(cap);
        if size >= min {
            self.store(&target);
            return Outcome::Done;
        }

        let surplus = |len: usize| len.saturating_sub(min);
        let free = |len: usize| cap.saturating_sub(len);
        let near = self.neighbors(path, &current);
        let emptied = match (near.left, near.right) {
            (Some(left), Some(right)) => {
                let left = self.stage_neighbor(left);
                let right = self.stage_neighbor(right);
                let (l, r) = (left.len(), right.len());
                if surplus(l) > surplus(r) {
                    let moved = 1 + surplus(l) / 2;
                    self.commit(vec![left, target], &[l - moved, size + moved], None);
                    return Outcome::Done;
                }
                if surplus(r) > 0 {
                    let moved = 1 + surplus(r) / 2;
                    self.commit(vec![target, right], &[size + moved, r - moved], None);
                    return Outcome::Done;
                }
                if free(l) + free(r) < size {
                    self.store(&target);
                    return Outcome::Done;
                }
                let to_right = size.div_ceil(2).max(size.saturating_sub(free(l))).min(free(r));
                self.commit(
                    vec![left, target, right],
                    &[l + size - to_right, 0, r + to_right],
                    None,
                );
                true
            }
            (Some(left), None) => {
                let left = self.stage_neighbor(left);
                let l = left.len();
                if surplus(l) > 0 {
                    let moved = 1 + surplus(l) / 2;
                    self.commit(vec![left, target], &[l - moved, size + moved], None);
                    return Outcome::Done;
                }
                match near.left_left.map(|far| self.stage_neighbor(far)) {
                    Some(far) if surplus(far.len()) > 0 => {
                        let ll = far.len();
                        let shifted = (1 + (2 * surplus(ll) - 1) / 3).min(l);
                        let moved = 1 + shifted / 2;
                        self.commit(
                            vec![far, left, target],
                            &[ll - moved, l - shifted + moved, size + shifted],
                            None,
                        );
                        return Outcome::Done;
                    }
                    Some(far) => {
                        let ll = far.len();
                        let needed = (l + size).saturating_sub(cap);
                        if needed > free(ll) {
                            self.store(&target);
                            return Outcome::Done;
                        }
                        let pushed = size.div_ceil(2).max(needed).min(free(ll)).min(l);
                        self.commit(
                            vec![far, left, target],
                            &[ll + pushed, l - pushed + size, 0],
                            None,
                        );
                        true
                    }
                    None => {
                        if l + size > cap {
                            self.store(&target);
                            return Outcome::Done;
                        }
                        self.commit(vec![left, target], &[l + size, 0], None);
                        true
                    }
                }
            }
            (None, Some(right)) => {
                let right = self.stage_neighbor(right);
                let r = right.len();
                if surplus(r) > 0 {
                    let moved = 1 + surplus(r) / 2;
                    self.commit(vec![target, right], &[size + moved, r - moved], None);
                    return Outcome::Done;
                }
                match near.right_right.map(|far| self.stage_neighbor(far)) {
                    Some(far) if surplus(far.len()) > 0 => {
                        let rr = far.len();
                        let shifted = (1 + (2 * surplus(rr) - 1) / 3).min(r);
                        let moved = 1 + shifted / 2;
                        self.commit(
                            vec![target, right, far],
                            &[size + shifted, r - shifted + moved, rr - moved],
                            None,
                        );
                        return Outcome::Done;
                    }
                    Some(far) => {
                        let rr = far.len();
                        let needed = (r + size).saturating_sub(cap);
                        if needed > free(rr) {
                            self.store(&target);
                            return Outcome::Done;
                        }
                        let pushed = size.div_ceil(2).max(needed).min(free(rr)).min(r);
                        self.commit(
                            vec![target, right, far],
                            &[0, r - pushed + size, rr + pushed],
                            None,
                        );
                        true
                    }
                    None => {
                        if r + size > cap {
                            self.store(&target);
                            return Outcome::Done;
                        }
                        self.commit(vec![target, right], &[0, r + size], None);
                        true
                    }
                }
            }
            (None, None) => {
                if size > 0 {
                    self.store(&target);
                    return Outcome::Done;
                }
                true
            }
        };

        if !emptied {
            return Outcome::Done;
        }
        if at_leaf {
            self.unlink_leaf(current.block);
        }
        self.dispose(current.block);
        Outcome::Emptied
    }

    /// Handle a root that lost an entry: drop an emptied root or collapse a
    /// single-child inner root onto its child.
    fn shrink_root(&mut self, first: Option<(BlockId, C::Elem)>, size: usize, at_leaf: bool) {
        let root = self.root;
        match (size, first) {
            (0, _) => {
                if at_leaf {
                    self.unlink_leaf(root);
                }
                self.dispose(root);
                self.reset_empty();
                tracing::debug!("tree emptied");
            }
            (1, Some((child, max))) if !at_leaf => {
                self.root = child;
                self.depth -= 1;
                self.max_elem = Some(max);
                self.dispose(root);
                tracing::debug!(depth = self.depth, size = self.size, "tree shrank a level");
            }
            _ => {}
        }
    }

    fn unlink_leaf(&mut self, id: BlockId) {
        let Some(leaf) = self.leaf(id) else {
            return;
        };
        let (prev, next) = (leaf.prev, leaf.next);
        match self.leaf_mut(prev) {
            Some(prev_leaf) => prev_leaf.next = next,
            None => self.first = next,
        }
        match self.leaf_mut(next) {
            Some(next_leaf) => next_leaf.prev = prev,
            None => self.last = prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::btree::{Block, NaturalOrder};
    use crate::config::TreeConfig;

    fn tree_with(leaf: usize, inner: usize) -> Tree<NaturalOrder<u64>> {
        Tree::with_config(NaturalOrder::new(), TreeConfig::default().with_capacities(leaf, inner))
            .expect("valid config")
    }

    fn leaves(tree: &Tree<NaturalOrder<u64>>) -> Vec<Vec<u64>> {
        let mut out = Vec::new();
        let mut id = tree.first().block();
        while let Some(leaf) = tree.block(id).and_then(Block::as_leaf) {
            out.push(leaf.elems().to_vec());
            id = leaf.next();
        }
        out
    }

    #[test]
    fn test_min_fill() {
        assert_eq!(min_fill(2), 2);
        assert_eq!(min_fill(3), 2);
        assert_eq!(min_fill(4), 3);
        assert_eq!(min_fill(62), 42);
    }

    #[test]
    fn test_delete_borrows_through_left_left_neighbour() {
        let mut tree = tree_with(4, 8);
        tree.build(&(1..=12).map(|v| v * 10).collect::<Vec<u64>>()).expect("build");
        assert!(tree.delete(&50));
        assert!(tree.delete(&120));
        assert_eq!(leaves(&tree).iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 3, 3]);

        // Left neighbour sits at the minimum; the leftmost leaf has one to spare.
        assert!(tree.delete(&90));
        assert_eq!(tree.stats().leaf_blocks, 3);
        assert_eq!(
            leaves(&tree),
            vec![vec![10, 20, 30], vec![40, 60, 70], vec![80, 100, 110]]
        );
        assert_eq!(tree.debug_check().bits(), 0);
    }

    #[test]
    fn test_delete_borrows_through_right_right_neighbour() {
        let mut tree = tree_with(4, 8);
        tree.build(&(1..=12).map(|v| v * 10).collect::<Vec<u64>>()).expect("build");
        assert!(tree.delete(&50));
        assert!(tree.delete(&10));
        assert_eq!(leaves(&tree).iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 4]);

        assert!(tree.delete(&20));
        assert_eq!(tree.stats().leaf_blocks, 3);
        assert_eq!(
            leaves(&tree),
            vec![vec![30, 40, 60], vec![70, 80, 90], vec![100, 110, 120]]
        );
        assert_eq!(tree.debug_check().bits(), 0);
    }

    #[test]
    fn test_delete_merges_and_collapses_root() {
        let mut tree = tree_with(2, 3);
        for value in [10, 20, 30] {
            tree.insert(value).expect("insert");
        }
        assert_eq!(tree.depth(), 2);

        assert!(tree.delete(&20));
        assert_eq!(tree.size(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(leaves(&tree), vec![vec![10, 30]]);
        assert_eq!(tree.max(), Some(&30));
        assert_eq!(tree.debug_check().bits(), 0);
    }

    #[test]
    fn test_delete_missing_element() {
        let mut tree = tree_with(3, 3);
        assert!(!tree.delete(&1));
        tree.insert(1).expect("insert");
        assert!(!tree.delete(&2));
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn test_delete_last_element_empties_tree() {
        let mut tree = tree_with(3, 3);
        tree.insert(1).expect("insert");
        assert!(tree.delete(&1));
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.max(), None);
        assert!(!tree.root().is_valid());
        assert!(tree.first().is_invalid());
        assert_eq!(tree.debug_check().bits(), 0);
    }

    #[test]
    fn test_delete_maximum_refreshes_tree_max() {
        let mut tree = tree_with(3, 3);
        for value in 0..50u64 {
            tree.insert(value).expect("insert");
        }
        for value in (30..50u64).rev() {
            assert!(tree.delete(&value));
            assert_eq!(tree.max(), Some(&(value - 1)));
            assert_eq!(tree.debug_check().bits(), 0);
        }
    }

    #[test]
    fn test_insert_then_delete_restores_contents() {
        let mut tree = tree_with(4, 3);
        for value in (0..200u64).map(|v| v * 3) {
            tree.insert(value).expect("insert");
        }
        let before: Vec<u64> = tree.iter().copied().collect();

        tree.insert(301).expect("insert");
        assert!(tree.delete(&301));
        assert_eq!(tree.iter().copied().collect::<Vec<_>>(), before);
        assert_eq!(tree.debug_check().bits(), 0);
    }

    #[test]
    fn test_random_deletes_match_model() {
        for (leaf, inner) in [(2, 3), (3, 3), (5, 4), (8, 6)] {
            let mut rng = StdRng::seed_from_u64(leaf as u64 * 31 + inner as u64);
            let mut tree = tree_with(leaf, inner);
            let mut model = BTreeSet::new();
            for _ in 0..600 {
                let value = rng.random_range(0..2_000u64);
                tree.insert(value).expect("insert");
                model.insert(value);
            }

            let mut order: Vec<u64> = model.iter().copied().collect();
            order.shuffle(&mut rng);
            for (step, value) in order.iter().enumerate() {
                assert!(tree.delete(value));
                model.remove(value);
                assert_eq!(tree.size(), model.len());
                assert_eq!(tree.debug_check().bits(), 0, "leaf {leaf} inner {inner} step {step}");
                if step % 50 == 0 {
                    assert!(tree.iter().copied().eq(model.iter().copied()));
                }
            }
            assert!(tree.is_empty());
            assert_eq!(tree.stats().leaf_blocks, 0);
            assert_eq!(tree.stats().inner_blocks, 0);
        }
    }

    #[test]
    fn test_mixed_workload_matches_model() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut tree = tree_with(3, 4);
        let mut model = BTreeSet::new();
        for _ in 0..5_000 {
            let value = rng.random_range(0..500u64);
            if rng.random_bool(0.55) {
                tree.insert(value).expect("insert");
                model.insert(value);
            } else {
                assert_eq!(tree.delete(&value), model.remove(&value));
            }
        }
        assert_eq!(tree.size(), model.len());
        assert_eq!(tree.debug_check().bits(), 0);
        assert!(tree.iter().copied().eq(model.iter().copied()));
        assert!(tree.iter_rev().copied().eq(model.iter().rev().copied()));
    }
}
