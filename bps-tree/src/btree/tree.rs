//! B+*-tree over arena blocks.
//!
//! The tree stores fixed-size elements in leaf blocks and routes searches
//! through inner blocks. Blocks are addressed by [`BlockId`] and resolved
//! through the arena on every access, so no reference into block storage
//! outlives a single step of an operation.
//!
//! Disposed blocks are chained into a garbage list and reused before the
//! arena is asked for fresh storage.

use super::block::{Block, BlockId, BlockKind, GarbageBlock, InnerBlock, LeafBlock};
use super::order::Comparator;
use super::search;
use crate::config::{ConfigError, TreeConfig};
use crate::storage::{BlockArena, ExtentAllocator, ExtentPool};

/// An in-memory B+*-tree index.
///
/// # Invariants
///
/// - elements are strictly increasing in every leaf and along the leaf list
/// - separator `i` of an inner block equals the maximum of child `i`
/// - `max_elem` equals the largest stored element
/// - `depth` is 0 for an empty tree and 1 when the root is a leaf
pub struct Tree<C: Comparator, A: ExtentAllocator = ExtentPool> {
    pub(super) cmp: C,
    pub(super) config: TreeConfig,
    pub(super) leaf_capacity: usize,
    pub(super) inner_capacity: usize,
    pub(super) arena: BlockArena<Block<C::Elem>, A>,
    pub(super) root: BlockId,
    pub(super) first: BlockId,
    pub(super) last: BlockId,
    pub(super) leaf_count: usize,
    pub(super) inner_count: usize,
    pub(super) garbage_count: usize,
    pub(super) garbage_head: BlockId,
    pub(super) depth: usize,
    pub(super) size: usize,
    pub(super) max_elem: Option<C::Elem>,
}

/// Errors that can occur during tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The extent allocator refused to hand out an extent.
    OutOfExtents,
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfExtents => write!(f, "extent allocator is out of extents"),
        }
    }
}

impl std::error::Error for TreeError {}

impl<C: Comparator> Tree<C, ExtentPool> {
    /// Create an empty tree with the default layout and an unbounded extent pool.
    #[must_use]
    pub fn new(cmp: C) -> Self {
        Self::from_parts(cmp, TreeConfig::default(), ExtentPool::unbounded())
    }

    /// Create an empty tree with the given layout and an unbounded extent pool.
    pub fn with_config(cmp: C, config: TreeConfig) -> Result<Self, ConfigError> {
        Self::with_allocator(cmp, config, ExtentPool::unbounded())
    }
}

impl<C: Comparator, A: ExtentAllocator> Tree<C, A> {
    /// Create an empty tree drawing extents from `allocator`.
    pub fn with_allocator(cmp: C, config: TreeConfig, allocator: A) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(cmp, config, allocator))
    }

    fn from_parts(cmp: C, config: TreeConfig, allocator: A) -> Self {
        Self {
            leaf_capacity: config.leaf_capacity_for::<C::Elem>(),
            inner_capacity: config.inner_capacity_for::<C::Elem>(),
            arena: BlockArena::new(allocator, config.blocks_per_extent()),
            cmp,
            config,
            root: BlockId::INVALID,
            first: BlockId::INVALID,
            last: BlockId::INVALID,
            leaf_count: 0,
            inner_count: 0,
            garbage_count: 0,
            garbage_head: BlockId::INVALID,
            depth: 0,
            size: 0,
            max_elem: None,
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Check if the tree holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of block levels: 0 when empty, 1 when the root is a leaf.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes of extent memory held by the tree.
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.arena.extent_count() * self.config.extent_size
    }

    /// Maximum number of elements in a leaf.
    #[must_use]
    pub const fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Maximum number of children of an inner block.
    #[must_use]
    pub const fn inner_capacity(&self) -> usize {
        self.inner_capacity
    }

    /// The layout this tree was created with.
    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The comparator this tree orders by.
    #[must_use]
    pub const fn comparator(&self) -> &C {
        &self.cmp
    }

    /// The extent allocator behind this tree.
    #[must_use]
    pub const fn allocator(&self) -> &A {
        self.arena.allocator()
    }

    /// The largest stored element.
    #[must_use]
    pub const fn max(&self) -> Option<&C::Elem> {
        self.max_elem.as_ref()
    }

    /// Id of the root block, `BlockId::INVALID` when empty.
    #[must_use]
    pub const fn root(&self) -> BlockId {
        self.root
    }

    /// Resolve a block id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block<C::Elem>> {
        self.arena.get(id.get())
    }

    /// Look up the element equal to `key`.
    #[must_use]
    pub fn find(&self, key: &C::Key) -> Option<&C::Elem> {
        let mut id = self.root;
        loop {
            match self.block(id)? {
                Block::Inner(inner) => {
                    let (pos, _) =
                        search::lower_bound_key(&self.cmp, &inner.separators, key, self.config.search);
                    id = inner.children.get(pos).copied()?;
                }
                Block::Leaf(leaf) => {
                    let (pos, exact) =
                        search::lower_bound_key(&self.cmp, &leaf.elems, key, self.config.search);
                    return if exact { leaf.elems.get(pos) } else { None };
                }
                Block::Garbage(_) => return None,
            }
        }
    }

    /// Pick an element using `rnd` as the source of randomness.
    ///
    /// At each level the child is `rnd % children` and `rnd` is divided by
    /// the child count before descending, so one random word drives the whole
    /// walk. The pick is uniform over blocks, not over elements.
    #[must_use]
    pub fn random(&self, rnd: usize) -> Option<&C::Elem> {
        let mut rnd = rnd;
        let mut id = self.root;
        loop {
            match self.block(id)? {
                Block::Inner(inner) => {
                    let count = inner.children.len();
                    if count == 0 {
                        return None;
                    }
                    id = inner.children.get(rnd % count).copied()?;
                    rnd /= count;
                }
                Block::Leaf(leaf) => {
                    let count = leaf.elems.len();
                    if count == 0 {
                        return None;
                    }
                    return leaf.elems.get(rnd % count);
                }
                Block::Garbage(_) => return None,
            }
        }
    }

    pub(super) fn leaf(&self, id: BlockId) -> Option<&LeafBlock<C::Elem>> {
        self.block(id)?.as_leaf()
    }

    pub(super) fn leaf_mut(&mut self, id: BlockId) -> Option<&mut LeafBlock<C::Elem>> {
        self.arena.get_mut(id.get())?.as_leaf_mut()
    }

    pub(super) fn inner(&self, id: BlockId) -> Option<&InnerBlock<C::Elem>> {
        self.block(id)?.as_inner()
    }

    pub(super) fn inner_mut(&mut self, id: BlockId) -> Option<&mut InnerBlock<C::Elem>> {
        self.arena.get_mut(id.get())?.as_inner_mut()
    }

    /// Store a new leaf or inner block, reusing garbage before asking the arena.
    pub(super) fn create_block(&mut self, block: Block<C::Elem>) -> Result<BlockId, TreeError> {
        let kind = block.kind();
        let id = match self.pop_garbage() {
            Some(id) => {
                if let Some(slot) = self.arena.get_mut(id.get()) {
                    *slot = block;
                }
                id
            }
            None => self.alloc_fresh(block)?,
        };
        match kind {
            BlockKind::Leaf => self.leaf_count += 1,
            BlockKind::Inner => self.inner_count += 1,
            BlockKind::Garbage => self.push_garbage(id),
        }
        Ok(id)
    }

    /// Turn a leaf or inner block into garbage.
    pub(super) fn dispose(&mut self, id: BlockId) {
        match self.block(id).map(Block::kind) {
            Some(BlockKind::Leaf) => self.leaf_count -= 1,
            Some(BlockKind::Inner) => self.inner_count -= 1,
            Some(BlockKind::Garbage) | None => return,
        }
        self.push_garbage(id);
    }

    /// Make sure at least `count` blocks can be created without touching the allocator.
    pub(super) fn reserve_blocks(&mut self, count: usize) -> Result<(), TreeError> {
        while self.garbage_count < count {
            let id = self.alloc_fresh(Block::Garbage(GarbageBlock {
                id: BlockId::INVALID,
                next: BlockId::INVALID,
            }))?;
            self.push_garbage(id);
        }
        Ok(())
    }

    fn alloc_fresh(&mut self, block: Block<C::Elem>) -> Result<BlockId, TreeError> {
        match self.arena.alloc(block) {
            Some(raw) => Ok(BlockId::new(raw)),
            None => {
                tracing::warn!(
                    extents = self.arena.extent_count(),
                    size = self.size,
                    "extent allocation failed"
                );
                Err(TreeError::OutOfExtents)
            }
        }
    }

    fn push_garbage(&mut self, id: BlockId) {
        if let Some(slot) = self.arena.get_mut(id.get()) {
            *slot = Block::Garbage(GarbageBlock {
                id,
                next: self.garbage_head,
            });
            self.garbage_head = id;
            self.garbage_count += 1;
        }
    }

    fn pop_garbage(&mut self) -> Option<BlockId> {
        let id = self.garbage_head;
        let Some(Block::Garbage(garbage)) = self.block(id) else {
            return None;
        };
        self.garbage_head = garbage.next;
        self.garbage_count -= 1;
        Some(id)
    }

    /// Forget the whole structure; blocks must already be disposed.
    pub(super) fn reset_empty(&mut self) {
        self.root = BlockId::INVALID;
        self.first = BlockId::INVALID;
        self.last = BlockId::INVALID;
        self.depth = 0;
        self.size = 0;
        self.max_elem = None;
    }
}
