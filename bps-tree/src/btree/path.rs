//! Root-to-leaf paths and staged block contents.
//!
//! Mutations collect the path from the root to the target leaf once. Each
//! path element remembers where the maximum of its block is stored (a
//! parent separator, or the tree-wide maximum for blocks on the rightmost
//! edge), so rebalancing can refresh it after moving entries around.
//!
//! Rebalancing works on [`Staged`] copies: a leaf is staged as its elements,
//! an inner block as `(child, child max)` pairs. Entries are shuffled between
//! staged neighbours and written back with [`Tree::store`], which also
//! refreshes the stored maximum.

use super::block::{Block, BlockId};
use super::order::Comparator;
use super::search;
use super::tree::Tree;
use crate::storage::ExtentAllocator;

/// Where the maximum element of a block is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MaxSlot {
    /// The tree-wide maximum.
    Tree,
    /// Separator `pos` of inner block `block`.
    Separator { block: BlockId, pos: usize },
    /// Not stored anywhere yet: a block created by a split that has no parent entry.
    Detached,
}

/// One level of a collected path.
#[derive(Debug, Clone, Copy)]
pub(super) struct PathElem {
    pub(super) block: BlockId,
    /// Child taken (inner) or element position (leaf).
    pub(super) insertion_point: usize,
    pub(super) pos_in_parent: usize,
    /// Index of the parent in the path, `None` for the root.
    pub(super) parent: Option<usize>,
    pub(super) slot: MaxSlot,
}

/// A staged entry: an element of a leaf, or a child of an inner block with its maximum.
#[derive(Debug, Clone, Copy)]
pub(super) struct Entry<E> {
    pub(super) child: BlockId,
    pub(super) value: E,
}

impl<E> Entry<E> {
    pub(super) const fn elem(value: E) -> Self {
        Self {
            child: BlockId::INVALID,
            value,
        }
    }
}

/// Working copy of a block's contents.
#[derive(Debug)]
pub(super) struct Staged<E> {
    pub(super) id: BlockId,
    pub(super) slot: MaxSlot,
    pub(super) entries: Vec<Entry<E>>,
}

impl<E: Copy> Staged<E> {
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn max(&self) -> Option<E> {
        self.entries.last().map(|entry| entry.value)
    }
}

/// A sibling of a path element under the same parent.
#[derive(Debug, Clone, Copy)]
pub(super) struct Neighbor {
    pub(super) block: BlockId,
    pub(super) slot: MaxSlot,
}

/// Siblings up to two positions away on either side.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Neighbors {
    pub(super) left: Option<Neighbor>,
    pub(super) left_left: Option<Neighbor>,
    pub(super) right: Option<Neighbor>,
    pub(super) right_right: Option<Neighbor>,
}

/// Slot of child `pos` of `parent`, which has `len` children.
const fn child_slot(parent: &PathElem, pos: usize, len: usize) -> MaxSlot {
    if pos + 1 < len {
        MaxSlot::Separator {
            block: parent.block,
            pos,
        }
    } else {
        parent.slot
    }
}

/// Refill `window` left to right with the given sizes, keeping entry order.
///
/// `insert` places one extra entry at `(block index, position)` before the
/// refill. `sizes` must add up to the total entry count.
pub(super) fn distribute<E: Copy>(
    window: &mut [Staged<E>],
    sizes: &[usize],
    insert: Option<(usize, usize, Entry<E>)>,
) {
    let total: usize = sizes.iter().sum();
    let mut all = Vec::with_capacity(total);
    for (index, staged) in window.iter_mut().enumerate() {
        let mut entries = std::mem::take(&mut staged.entries);
        if let Some((_, pos, entry)) = insert.filter(|&(target, _, _)| target == index) {
            entries.insert(pos, entry);
        }
        all.append(&mut entries);
    }
    debug_assert_eq!(all.len(), total, "sizes must cover every entry");

    let mut rest = all.into_iter();
    for (staged, &size) in window.iter_mut().zip(sizes) {
        staged.entries = rest.by_ref().take(size).collect();
    }
}

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Collect the path towards `elem`.
    ///
    /// Returns the path (root first, leaf last) and whether the leaf holds an
    /// element equal to `elem` at the leaf's insertion point. Returns `None`
    /// for an empty tree.
    pub(super) fn collect_path(&self, elem: &C::Elem) -> Option<(Vec<PathElem>, bool)> {
        let mut path = Vec::with_capacity(self.depth);
        let mut current = PathElem {
            block: self.root,
            insertion_point: 0,
            pos_in_parent: 0,
            parent: None,
            slot: MaxSlot::Tree,
        };
        loop {
            match self.block(current.block)? {
                Block::Inner(inner) => {
                    let (pos, _) =
                        search::lower_bound_elem(&self.cmp, &inner.separators, elem, self.config.search);
                    let child = inner.children.get(pos).copied()?;
                    current.insertion_point = pos;
                    let slot = child_slot(&current, pos, inner.children.len());
                    path.push(current);
                    current = PathElem {
                        block: child,
                        insertion_point: 0,
                        pos_in_parent: pos,
                        parent: Some(path.len() - 1),
                        slot,
                    };
                }
                Block::Leaf(leaf) => {
                    let (pos, exact) =
                        search::lower_bound_elem(&self.cmp, &leaf.elems, elem, self.config.search);
                    current.insertion_point = pos;
                    path.push(current);
                    return Some((path, exact));
                }
                Block::Garbage(_) => return None,
            }
        }
    }

    /// Siblings of `elem` under its parent.
    pub(super) fn neighbors(&self, path: &[PathElem], elem: &PathElem) -> Neighbors {
        let Some(parent) = elem.parent.and_then(|index| path.get(index)) else {
            return Neighbors::default();
        };
        let Some(inner) = self.inner(parent.block) else {
            return Neighbors::default();
        };
        let len = inner.children.len();
        let sibling = |pos: usize| {
            inner.children.get(pos).map(|&block| Neighbor {
                block,
                slot: child_slot(parent, pos, len),
            })
        };
        let pos = elem.pos_in_parent;
        Neighbors {
            left: pos.checked_sub(1).and_then(&sibling),
            left_left: pos.checked_sub(2).and_then(&sibling),
            right: sibling(pos + 1),
            right_right: sibling(pos + 2),
        }
    }

    /// Read the maximum kept in `slot`.
    pub(super) fn slot_max(&self, slot: MaxSlot) -> Option<C::Elem> {
        match slot {
            MaxSlot::Tree => self.max_elem,
            MaxSlot::Separator { block, pos } => self.inner(block)?.separators.get(pos).copied(),
            MaxSlot::Detached => None,
        }
    }

    /// Overwrite the maximum kept in `slot`.
    pub(super) fn set_slot_max(&mut self, slot: MaxSlot, value: C::Elem) {
        match slot {
            MaxSlot::Tree => self.max_elem = Some(value),
            MaxSlot::Separator { block, pos } => {
                if let Some(separator) = self
                    .inner_mut(block)
                    .and_then(|inner| inner.separators.get_mut(pos))
                {
                    *separator = value;
                }
            }
            MaxSlot::Detached => {}
        }
    }

    /// Stage the contents of `block`, whose maximum lives in `slot`.
    pub(super) fn stage(&self, block: BlockId, slot: MaxSlot) -> Staged<C::Elem> {
        let entries = match self.block(block) {
            Some(Block::Leaf(leaf)) => leaf.elems.iter().map(|&value| Entry::elem(value)).collect(),
            Some(Block::Inner(inner)) => {
                let values = inner
                    .separators
                    .iter()
                    .copied()
                    .chain(self.slot_max(slot));
                let entries: Vec<_> = inner
                    .children
                    .iter()
                    .zip(values)
                    .map(|(&child, value)| Entry { child, value })
                    .collect();
                debug_assert_eq!(entries.len(), inner.children.len(), "inner block lost its maximum");
                entries
            }
            _ => Vec::new(),
        };
        Staged {
            id: block,
            slot,
            entries,
        }
    }

    pub(super) fn stage_neighbor(&self, neighbor: Neighbor) -> Staged<C::Elem> {
        self.stage(neighbor.block, neighbor.slot)
    }

    /// Write staged contents back and refresh the block's maximum.
    ///
    /// An emptied block keeps its old maximum; the caller removes it from its parent.
    pub(super) fn store(&mut self, staged: &Staged<C::Elem>) {
        match self.arena.get_mut(staged.id.get()) {
            Some(Block::Leaf(leaf)) => {
                leaf.elems.clear();
                leaf.elems.extend(staged.entries.iter().map(|entry| entry.value));
            }
            Some(Block::Inner(inner)) => {
                let separators = staged.entries.len().saturating_sub(1);
                inner.children.clear();
                inner.children.extend(staged.entries.iter().map(|entry| entry.child));
                inner.separators.clear();
                inner
                    .separators
                    .extend(staged.entries[..separators].iter().map(|entry| entry.value));
            }
            _ => return,
        }
        if let Some(max) = staged.max() {
            self.set_slot_max(staged.slot, max);
        }
    }

    /// Redistribute `window` to `sizes` and write every block back.
    pub(super) fn commit(
        &mut self,
        mut window: Vec<Staged<C::Elem>>,
        sizes: &[usize],
        insert: Option<(usize, usize, Entry<C::Elem>)>,
    ) {
        distribute(&mut window, sizes, insert);
        for staged in &window {
            self.store(staged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::NaturalOrder;
    use crate::config::TreeConfig;

    fn staged(id: u32, values: &[u32]) -> Staged<u32> {
        Staged {
            id: BlockId::new(id),
            slot: MaxSlot::Detached,
            entries: values.iter().map(|&v| Entry::elem(v)).collect(),
        }
    }

    fn values(staged: &Staged<u32>) -> Vec<u32> {
        staged.entries.iter().map(|e| e.value).collect()
    }

    #[test]
    fn test_distribute_moves_entries_between_blocks() {
        let mut window = vec![staged(0, &[1, 2]), staged(1, &[3, 4, 5, 6])];
        distribute(&mut window, &[4, 2], None);
        assert_eq!(values(&window[0]), vec![1, 2, 3, 4]);
        assert_eq!(values(&window[1]), vec![5, 6]);
    }

    #[test]
    fn test_distribute_places_inserted_entry() {
        let mut window = vec![staged(0, &[1, 2, 3]), staged(1, &[])];
        distribute(&mut window, &[2, 2], Some((0, 1, Entry::elem(9))));
        assert_eq!(values(&window[0]), vec![1, 9]);
        assert_eq!(values(&window[1]), vec![2, 3]);
    }

    #[test]
    fn test_distribute_can_empty_a_block() {
        let mut window = vec![staged(0, &[1]), staged(1, &[2]), staged(2, &[3])];
        distribute(&mut window, &[2, 0, 1], None);
        assert_eq!(values(&window[0]), vec![1, 2]);
        assert!(window[1].entries.is_empty());
        assert_eq!(values(&window[2]), vec![3]);
    }

    #[test]
    fn test_collect_path_tracks_slots() {
        let mut tree = Tree::with_config(
            NaturalOrder::<u32>::new(),
            TreeConfig::default().with_capacities(2, 3),
        )
        .expect("valid config");
        for value in [10, 20, 30] {
            tree.insert(value).expect("insert");
        }

        let (path, exact) = tree.collect_path(&10).expect("non-empty tree");
        assert!(exact);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].slot, MaxSlot::Tree);
        assert_eq!(
            path[1].slot,
            MaxSlot::Separator {
                block: path[0].block,
                pos: 0
            }
        );

        let (path, exact) = tree.collect_path(&40).expect("non-empty tree");
        assert!(!exact);
        assert_eq!(path[1].pos_in_parent, 1);
        assert_eq!(path[1].slot, MaxSlot::Tree);
        assert_eq!(tree.slot_max(path[1].slot), Some(30));
    }

    #[test]
    fn test_stage_inner_block_includes_last_maximum() {
        let mut tree = Tree::with_config(
            NaturalOrder::<u32>::new(),
            TreeConfig::default().with_capacities(2, 3),
        )
        .expect("valid config");
        for value in [10, 20, 30] {
            tree.insert(value).expect("insert");
        }
        let root = tree.stage(tree.root(), MaxSlot::Tree);
        let maxes: Vec<u32> = root.entries.iter().map(|e| e.value).collect();
        assert_eq!(maxes, vec![20, 30]);
    }
}
