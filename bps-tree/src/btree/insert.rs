//! Insertion.
//!
//! A full block first tries to shed entries to a neighbour, then to a
//! neighbour's neighbour through the near one, and only then splits. A split
//! adds one empty block to the full neighbourhood and spreads the entries
//! evenly over all of them, so the tree stays at roughly 2/3 occupancy or
//! better. The new block is then inserted into the parent, which follows the
//! same rules.

use super::block::{Block, BlockId, InnerBlock, LeafBlock};
use super::order::Comparator;
use super::path::{Entry, MaxSlot, PathElem, Staged, distribute};
use super::tree::{Tree, TreeError};
use crate::storage::ExtentAllocator;

/// Result of inserting an entry into one level.
enum Outcome<E> {
    /// The entry was absorbed at this level.
    Done,
    /// The target block was split; `block` must be inserted into the parent.
    Split { target_max: E, block: BlockId, max: E },
}

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Insert an element.
    ///
    /// If an equal element is already stored it is overwritten in place and
    /// returned; iterators pointing at it stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OutOfExtents`] if a split needs blocks the
    /// allocator cannot provide. The tree is left exactly as it was.
    pub fn insert(&mut self, elem: C::Elem) -> Result<Option<C::Elem>, TreeError> {
        if !self.root.is_valid() {
            self.insert_first(elem)?;
            return Ok(None);
        }
        let Some((mut path, exact)) = self.collect_path(&elem) else {
            return Ok(None);
        };
        let leaf_index = path.len() - 1;
        if exact {
            return Ok(self.replace(&path[leaf_index], elem));
        }

        let mut index = leaf_index;
        let mut entry = Entry::elem(elem);
        loop {
            match self.insert_into(&path, index, entry, index == leaf_index)? {
                Outcome::Done => break,
                Outcome::Split {
                    target_max,
                    block,
                    max,
                } => {
                    let current = path[index];
                    entry = Entry { child: block, value: max };
                    let Some(parent) = current.parent else {
                        self.grow_root(current.block, target_max, block, max)?;
                        break;
                    };
                    path[parent].insertion_point = current.pos_in_parent + 1;
                    index = parent;
                }
            }
        }
        self.size += 1;
        Ok(None)
    }

    fn insert_first(&mut self, elem: C::Elem) -> Result<(), TreeError> {
        let mut leaf = LeafBlock::with_capacity(self.leaf_capacity);
        leaf.elems.push(elem);
        let id = self.create_block(Block::Leaf(leaf))?;
        self.root = id;
        self.first = id;
        self.last = id;
        self.depth = 1;
        self.size = 1;
        self.max_elem = Some(elem);
        Ok(())
    }

    fn replace(&mut self, at: &PathElem, elem: C::Elem) -> Option<C::Elem> {
        let leaf = self.leaf_mut(at.block)?;
        let is_last = at.insertion_point + 1 == leaf.elems.len();
        let old = std::mem::replace(leaf.elems.get_mut(at.insertion_point)?, elem);
        if is_last {
            self.set_slot_max(at.slot, elem);
        }
        Some(old)
    }

    /// Insert `entry` into the block at `path[index]`.
    #[allow(clippy::too_many_lines)] // One arm per neighbour layout
    fn insert_into(
        &mut self,
        path: &[PathElem],
        index: usize,
        entry: Entry<C::Elem>,
        at_leaf: bool,
    ) -> Result<Outcome<C::Elem>, TreeError> {
        let cap = if at_leaf {
            self.leaf_capacity
        } else {
            self.inner_capacity
        };
        let current = path[index];
        let pos = current.insertion_point;
        let mut target = self.stage(current.block, current.slot);
        if target.len() < cap {
            target.entries.insert(pos, entry);
            self.store(&target);
            return Ok(Outcome::Done);
        }

        let free = |staged: &Staged<C::Elem>| cap.saturating_sub(staged.len());
        let near = self.neighbors(path, &current);
        let window = match (near.left, near.right) {
            (Some(left), Some(right)) => {
                let left = self.stage_neighbor(left);
                let right = self.stage_neighbor(right);
                let (left_free, right_free) = (free(&left), free(&right));
                if left_free > right_free {
                    let moved = 1 + left_free / 2;
                    let sizes = [left.len() + moved, cap + 1 - moved];
                    self.commit(vec![left, target], &sizes, Some((1, pos, entry)));
                    return Ok(Outcome::Done);
                }
                if right_free > 0 {
                    let moved = 1 + right_free / 2;
                    let sizes = [cap + 1 - moved, right.len() + moved];
                    self.commit(vec![target, right], &sizes, Some((0, pos, entry)));
                    return Ok(Outcome::Done);
                }
                vec![left, target, right]
            }
            (Some(left), None) => {
                let left = self.stage_neighbor(left);
                let left_free = free(&left);
                if left_free > 0 {
                    let moved = 1 + left_free / 2;
                    let sizes = [left.len() + moved, cap + 1 - moved];
                    self.commit(vec![left, target], &sizes, Some((1, pos, entry)));
                    return Ok(Outcome::Done);
                }
                match near.left_left.map(|far| self.stage_neighbor(far)) {
                    Some(far) if free(&far) > 0 => {
                        let shifted = 1 + (2 * free(&far) - 1) / 3;
                        let moved = 1 + shifted / 2;
                        let sizes = [far.len() + shifted, cap - shifted + moved, cap + 1 - moved];
                        self.commit(vec![far, left, target], &sizes, Some((2, pos, entry)));
                        return Ok(Outcome::Done);
                    }
                    Some(far) => vec![far, left, target],
                    None => vec![left, target],
                }
            }
            (None, Some(right)) => {
                let right = self.stage_neighbor(right);
                let right_free = free(&right);
                if right_free > 0 {
                    let moved = 1 + right_free / 2;
                    let sizes = [cap + 1 - moved, right.len() + moved];
                    self.commit(vec![target, right], &sizes, Some((0, pos, entry)));
                    return Ok(Outcome::Done);
                }
                match near.right_right.map(|far| self.stage_neighbor(far)) {
                    Some(far) if free(&far) > 0 => {
                        let shifted = 1 + (2 * free(&far) - 1) / 3;
                        let moved = 1 + shifted / 2;
                        let sizes = [cap + 1 - moved, cap - shifted + moved, far.len() + shifted];
                        self.commit(vec![target, right, far], &sizes, Some((0, pos, entry)));
                        return Ok(Outcome::Done);
                    }
                    Some(far) => vec![target, right, far],
                    None => vec![target, right],
                }
            }
            (None, None) => vec![target],
        };

        self.split(window, current.block, pos, entry, at_leaf)
    }

    /// Add a fresh block after `target` and spread the full `window` over it.
    fn split(
        &mut self,
        mut window: Vec<Staged<C::Elem>>,
        target: BlockId,
        pos: usize,
        entry: Entry<C::Elem>,
        at_leaf: bool,
    ) -> Result<Outcome<C::Elem>, TreeError> {
        if at_leaf {
            // One new block per level plus a new root covers the whole cascade.
            self.reserve_blocks(self.depth + 1)?;
        }
        let Some(target_index) = window.iter().position(|staged| staged.id == target) else {
            return Ok(Outcome::Done);
        };

        let empty = if at_leaf {
            Block::Leaf(LeafBlock::with_capacity(self.leaf_capacity))
        } else {
            Block::Inner(InnerBlock::with_capacity(self.inner_capacity))
        };
        let block = self.create_block(empty)?;
        if at_leaf {
            self.link_leaf_after(target, block);
        }
        window.insert(
            target_index + 1,
            Staged {
                id: block,
                slot: MaxSlot::Detached,
                entries: Vec::new(),
            },
        );

        let total = window.iter().map(Staged::len).sum::<usize>() + 1;
        let count = window.len();
        let sizes: Vec<usize> = (0..count)
            .map(|i| total / count + usize::from(i < total % count))
            .collect();
        distribute(&mut window, &sizes, Some((target_index, pos, entry)));

        let target_max = window[target_index].max();
        let max = window[target_index + 1].max();
        for staged in &window {
            self.store(staged);
        }
        match (target_max, max) {
            (Some(target_max), Some(max)) => Ok(Outcome::Split {
                target_max,
                block,
                max,
            }),
            _ => Ok(Outcome::Done),
        }
    }

    fn link_leaf_after(&mut self, target: BlockId, block: BlockId) {
        let next = self.leaf(target).map_or(BlockId::INVALID, |leaf| leaf.next);
        match self.leaf_mut(next) {
            Some(next_leaf) => next_leaf.prev = block,
            None => self.last = block,
        }
        if let Some(leaf) = self.leaf_mut(block) {
            leaf.prev = target;
            leaf.next = next;
        }
        if let Some(leaf) = self.leaf_mut(target) {
            leaf.next = block;
        }
    }

    /// Put a new root above the split old root.
    fn grow_root(
        &mut self,
        left: BlockId,
        left_max: C::Elem,
        right: BlockId,
        right_max: C::Elem,
    ) -> Result<(), TreeError> {
        let mut root = InnerBlock::with_capacity(self.inner_capacity);
        root.separators.push(left_max);
        root.children.extend([left, right]);
        self.root = self.create_block(Block::Inner(root))?;
        self.depth += 1;
        self.max_elem = Some(right_max);
        tracing::debug!(depth = self.depth, size = self.size, "tree grew a level");
        Ok(())
    }
}
