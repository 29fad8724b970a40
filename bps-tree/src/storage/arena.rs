//! Block arena addressed by integer ids.
//!
//! Blocks are carved out of extents in allocation order: block id `n` lives
//! in extent `n / blocks_per_extent` at slot `n % blocks_per_extent`. Ids are
//! never handed back to the arena; the owner recycles blocks itself. Every
//! extent is returned to the allocator when the arena is dropped.

use super::allocator::{ExtentAllocator, ExtentId};

/// Raw id reserved as the "no block" sentinel.
const RESERVED_ID: u32 = u32::MAX;

/// One extent worth of blocks.
#[derive(Debug)]
struct Extent<B> {
    id: ExtentId,
    blocks: Vec<B>,
}

/// Arena of blocks backed by extents from an [`ExtentAllocator`].
#[derive(Debug)]
pub struct BlockArena<B, A: ExtentAllocator> {
    allocator: A,
    extents: Vec<Extent<B>>,
    blocks_per_extent: usize,
    block_count: usize,
}

impl<B, A: ExtentAllocator> BlockArena<B, A> {
    /// Create an empty arena. No extent is requested until the first block.
    #[must_use]
    pub fn new(allocator: A, blocks_per_extent: usize) -> Self {
        Self {
            allocator,
            extents: Vec::new(),
            blocks_per_extent: blocks_per_extent.max(1),
            block_count: 0,
        }
    }

    /// Store `block` under a fresh id.
    ///
    /// Returns `None` if a new extent is needed and the allocator refuses it,
    /// or if the id space is exhausted.
    pub fn alloc(&mut self, block: B) -> Option<u32> {
        let id = u32::try_from(self.block_count)
            .ok()
            .filter(|&id| id != RESERVED_ID)?;

        if self.block_count == self.extents.len() * self.blocks_per_extent {
            let extent = self.allocator.allocate()?;
            tracing::trace!(extent, blocks = self.blocks_per_extent, "mapped extent");
            self.extents.push(Extent {
                id: extent,
                blocks: Vec::with_capacity(self.blocks_per_extent),
            });
        }

        self.extents.last_mut()?.blocks.push(block);
        self.block_count += 1;
        Some(id)
    }

    /// Resolve a block id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&B> {
        let index = id as usize;
        self.extents
            .get(index / self.blocks_per_extent)?
            .blocks
            .get(index % self.blocks_per_extent)
    }

    /// Resolve a block id for mutation.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut B> {
        let index = id as usize;
        self.extents
            .get_mut(index / self.blocks_per_extent)?
            .blocks
            .get_mut(index % self.blocks_per_extent)
    }

    /// Number of extents held.
    #[must_use]
    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    /// Number of blocks ever stored.
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Number of blocks per extent.
    #[must_use]
    pub const fn blocks_per_extent(&self) -> usize {
        self.blocks_per_extent
    }

    /// The extent allocator behind this arena.
    #[must_use]
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<B, A: ExtentAllocator> Drop for BlockArena<B, A> {
    fn drop(&mut self) {
        if !self.extents.is_empty() {
            tracing::debug!(
                extents = self.extents.len(),
                blocks = self.block_count,
                "releasing extents"
            );
        }
        for extent in self.extents.drain(..) {
            self.allocator.free(extent.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::storage::ExtentPool;

    /// Allocator that records every freed extent.
    struct Recording {
        pool: ExtentPool,
        freed: Rc<RefCell<Vec<ExtentId>>>,
    }

    impl ExtentAllocator for Recording {
        fn allocate(&mut self) -> Option<ExtentId> {
            self.pool.allocate()
        }

        fn free(&mut self, id: ExtentId) {
            self.freed.borrow_mut().push(id);
            self.pool.free(id);
        }
    }

    #[test]
    fn test_ids_fill_extents_in_order() {
        let mut arena = BlockArena::new(ExtentPool::unbounded(), 4);
        for expected in 0..10u32 {
            assert_eq!(arena.alloc(expected * 10), Some(expected));
        }
        assert_eq!(arena.extent_count(), 3);
        assert_eq!(arena.block_count(), 10);
        assert_eq!(arena.get(0), Some(&0));
        assert_eq!(arena.get(5), Some(&50));
        assert_eq!(arena.get(9), Some(&90));
        assert_eq!(arena.get(10), None);
        assert_eq!(arena.get(u32::MAX), None);
    }

    #[test]
    fn test_get_mut_updates_block() {
        let mut arena = BlockArena::new(ExtentPool::unbounded(), 2);
        let id = arena.alloc(1).expect("alloc");
        *arena.get_mut(id).expect("resolve") = 7;
        assert_eq!(arena.get(id), Some(&7));
    }

    #[test]
    fn test_allocator_refusal_is_reported() {
        let mut arena = BlockArena::new(ExtentPool::bounded(1), 2);
        assert_eq!(arena.alloc('a'), Some(0));
        assert_eq!(arena.alloc('b'), Some(1));
        assert_eq!(arena.alloc('c'), None);
        assert_eq!(arena.block_count(), 2);
        assert_eq!(arena.allocator().allocated_count(), 1);
    }

    #[test]
    fn test_drop_returns_every_extent() {
        let freed = Rc::new(RefCell::new(Vec::new()));
        {
            let allocator = Recording {
                pool: ExtentPool::unbounded(),
                freed: Rc::clone(&freed),
            };
            let mut arena = BlockArena::new(allocator, 2);
            for value in 0..5 {
                arena.alloc(value).expect("alloc");
            }
            assert_eq!(arena.extent_count(), 3);
        }
        assert_eq!(*freed.borrow(), vec![0, 1, 2]);
    }
}
