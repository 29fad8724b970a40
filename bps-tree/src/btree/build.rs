//! Bulk construction from sorted input.

use std::cmp::Ordering;

use super::block::{Block, BlockId, InnerBlock, LeafBlock};
use super::order::Comparator;
use super::tree::{Tree, TreeError};
use crate::storage::ExtentAllocator;

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Fill an empty tree from strictly increasing `elems`.
    ///
    /// Leaves are filled as evenly as possible with the minimum number of
    /// blocks, then each inner level is built the same way over the level
    /// below. Much faster than inserting one by one.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OutOfExtents`] if the allocator runs dry; every
    /// block created so far is released and the tree stays empty.
    pub fn build(&mut self, elems: &[C::Elem]) -> Result<(), TreeError> {
        debug_assert!(self.is_empty(), "build needs an empty tree");
        debug_assert!(
            elems
                .windows(2)
                .all(|pair| self.cmp.compare(&pair[0], &pair[1]) == Ordering::Less),
            "build input must be strictly increasing"
        );
        let Some(&max) = elems.last() else {
            return Ok(());
        };

        let mut created = Vec::new();
        match self.build_levels(elems, &mut created) {
            Ok((root, depth)) => {
                self.root = root;
                self.depth = depth;
                self.size = elems.len();
                self.max_elem = Some(max);
                tracing::debug!(size = self.size, depth, blocks = created.len(), "bulk build complete");
                Ok(())
            }
            Err(err) => {
                for &id in &created {
                    self.dispose(id);
                }
                self.reset_empty();
                tracing::warn!(elements = elems.len(), error = %err, "bulk build failed");
                Err(err)
            }
        }
    }

    /// Build every level bottom-up. Returns the root and the depth.
    fn build_levels(
        &mut self,
        elems: &[C::Elem],
        created: &mut Vec<BlockId>,
    ) -> Result<(BlockId, usize), TreeError> {
        let mut level = self.build_leaves(elems, created)?;
        let mut depth = 1;
        while level.len() > 1 {
            level = self.build_inner_level(&level, created)?;
            depth += 1;
        }
        let (root, _) = level[0];
        Ok((root, depth))
    }

    /// Create linked leaves; returns `(block, max)` for each.
    fn build_leaves(
        &mut self,
        elems: &[C::Elem],
        created: &mut Vec<BlockId>,
    ) -> Result<Vec<(BlockId, C::Elem)>, TreeError> {
        let count = elems.len().div_ceil(self.leaf_capacity);
        let mut level = Vec::with_capacity(count);
        let mut rest = elems;
        let mut prev = BlockId::INVALID;
        for left in (1..=count).rev() {
            let (chunk, tail) = rest.split_at(rest.len() / left);
            rest = tail;
            let mut leaf = LeafBlock::with_capacity(self.leaf_capacity);
            leaf.elems.extend_from_slice(chunk);
            leaf.prev = prev;
            let id = self.create_block(Block::Leaf(leaf))?;
            created.push(id);

            match self.leaf_mut(prev) {
                Some(prev_leaf) => prev_leaf.next = id,
                None => self.first = id,
            }
            self.last = id;
            prev = id;
            if let Some(&max) = chunk.last() {
                level.push((id, max));
            }
        }
        Ok(level)
    }

    /// Create one inner level over `below`.
    fn build_inner_level(
        &mut self,
        below: &[(BlockId, C::Elem)],
        created: &mut Vec<BlockId>,
    ) -> Result<Vec<(BlockId, C::Elem)>, TreeError> {
        let count = below.len().div_ceil(self.inner_capacity);
        let mut level = Vec::with_capacity(count);
        let mut rest = below;
        for left in (1..=count).rev() {
            let (chunk, tail) = rest.split_at(rest.len() / left);
            rest = tail;
            let Some((&(_, max), init)) = chunk.split_last() else {
                continue;
            };
            let mut inner = InnerBlock::with_capacity(self.inner_capacity);
            inner.separators.extend(init.iter().map(|&(_, sep)| sep));
            inner.children.extend(chunk.iter().map(|&(child, _)| child));
            let id = self.create_block(Block::Inner(inner))?;
            created.push(id);
            level.push((id, max));
        }
        Ok(level)
    }
}
