//! Block types of the tree.
//!
//! Every block lives in the arena under a [`BlockId`]:
//! - Leaf blocks: ordered elements, doubly-linked to their neighbours for range scans
//! - Inner blocks: ordered separators and one more child id than separators
//! - Garbage blocks: disposed blocks chained into the free list

use std::fmt;

/// Id of a block in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    /// The "no block" sentinel.
    pub const INVALID: Self = Self(u32::MAX);

    /// Wrap a raw arena id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw arena id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Check that this is not the sentinel.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#-")
        }
    }
}

/// Block type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Leaf,
    Inner,
    Garbage,
}

/// A leaf block.
#[derive(Debug, Clone)]
pub struct LeafBlock<E> {
    pub(crate) elems: Vec<E>,
    pub(crate) prev: BlockId,
    pub(crate) next: BlockId,
}

impl<E> LeafBlock<E> {
    /// Create an unlinked, empty leaf.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            elems: Vec::with_capacity(capacity),
            prev: BlockId::INVALID,
            next: BlockId::INVALID,
        }
    }

    /// Elements in ascending order.
    #[must_use]
    pub fn elems(&self) -> &[E] {
        &self.elems
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Check if the leaf holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// The previous leaf in key order.
    #[must_use]
    pub const fn prev(&self) -> BlockId {
        self.prev
    }

    /// The next leaf in key order.
    #[must_use]
    pub const fn next(&self) -> BlockId {
        self.next
    }
}

/// An inner block.
///
/// Stores N children and N-1 separators. Separator `i` is a copy of the
/// maximum element of child `i`. The maximum of the last child is not
/// stored here: it is the parent's separator for this block, or the
/// tree-wide maximum when this block is the root.
#[derive(Debug, Clone)]
pub struct InnerBlock<E> {
    pub(crate) separators: Vec<E>,
    pub(crate) children: Vec<BlockId>,
}

impl<E> InnerBlock<E> {
    /// Create an empty inner block.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            separators: Vec::with_capacity(capacity.saturating_sub(1)),
            children: Vec::with_capacity(capacity),
        }
    }

    /// Child ids in key order.
    #[must_use]
    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    /// Separator of child `i`.
    ///
    /// Returns `None` for the last child, whose maximum lives above this block.
    #[must_use]
    pub fn separator(&self, i: usize) -> Option<&E> {
        self.separators.get(i)
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if the block has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A disposed block waiting for reuse.
#[derive(Debug, Clone, Copy)]
pub struct GarbageBlock {
    pub(crate) id: BlockId,
    pub(crate) next: BlockId,
}

impl GarbageBlock {
    /// This block's own id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Next block on the free list.
    #[must_use]
    pub const fn next(&self) -> BlockId {
        self.next
    }
}

/// A block of the tree.
#[derive(Debug, Clone)]
pub enum Block<E> {
    Leaf(LeafBlock<E>),
    Inner(InnerBlock<E>),
    Garbage(GarbageBlock),
}

impl<E> Block<E> {
    /// The block type.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        match self {
            Self::Leaf(_) => BlockKind::Leaf,
            Self::Inner(_) => BlockKind::Inner,
            Self::Garbage(_) => BlockKind::Garbage,
        }
    }

    #[must_use]
    pub const fn as_leaf(&self) -> Option<&LeafBlock<E>> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> Option<&mut LeafBlock<E>> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_inner(&self) -> Option<&InnerBlock<E>> {
        match self {
            Self::Inner(inner) => Some(inner),
            _ => None,
        }
    }

    pub(crate) fn as_inner_mut(&mut self) -> Option<&mut InnerBlock<E>> {
        match self {
            Self::Inner(inner) => Some(inner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_sentinel() {
        assert!(!BlockId::INVALID.is_valid());
        assert!(BlockId::new(0).is_valid());
        assert_eq!(BlockId::new(7).get(), 7);
        assert_eq!(BlockId::new(7).to_string(), "#7");
        assert_eq!(BlockId::INVALID.to_string(), "#-");
    }

    #[test]
    fn test_last_child_has_no_separator() {
        let inner = InnerBlock {
            separators: vec![10, 20],
            children: vec![BlockId::new(1), BlockId::new(2), BlockId::new(3)],
        };
        assert_eq!(inner.separator(0), Some(&10));
        assert_eq!(inner.separator(1), Some(&20));
        assert_eq!(inner.separator(2), None);
        assert_eq!(inner.len(), 3);
    }

    #[test]
    fn test_block_kind_accessors() {
        let mut block: Block<u32> = Block::Leaf(LeafBlock::with_capacity(4));
        assert_eq!(block.kind(), BlockKind::Leaf);
        assert!(block.as_inner().is_none());
        block.as_leaf_mut().expect("leaf").elems.push(5);
        assert_eq!(block.as_leaf().map(LeafBlock::len), Some(1));

        let garbage: Block<u32> = Block::Garbage(GarbageBlock {
            id: BlockId::new(3),
            next: BlockId::INVALID,
        });
        assert_eq!(garbage.kind(), BlockKind::Garbage);
        assert!(garbage.as_leaf().is_none());
    }
}
