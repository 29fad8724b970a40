//! Extent allocator using a bitmap to track free/used extents.
//!
//! Each bit represents one extent id: 0 = free, 1 = used. The pool either
//! grows on demand or is capped at a fixed number of extents, which bounds
//! the memory a tree may take.

// Extent ids are u32 but bitmap indices are usize; usize is at least 32 bits
// on every target this crate builds for.
#![allow(clippy::cast_possible_truncation)]

/// Identifier of an extent handed out by an [`ExtentAllocator`].
pub type ExtentId = u32;

/// Number of bits per byte.
const BITS_PER_BYTE: usize = 8;

/// Source of fixed-size extents.
///
/// The tree only deals in extent ids; the memory behind an id is owned by
/// the block arena. Allocation failure is reported as `None` and is never
/// retried by the caller.
pub trait ExtentAllocator {
    /// Reserve a fresh extent.
    ///
    /// Returns `None` if no extent is available.
    fn allocate(&mut self) -> Option<ExtentId>;

    /// Return an extent previously obtained from [`ExtentAllocator::allocate`].
    fn free(&mut self, id: ExtentId);
}

/// A bitmap extent pool.
#[derive(Debug)]
pub struct ExtentPool {
    /// The bitmap data.
    bitmap: Vec<u8>,
    /// Number of extent ids currently tracked by the bitmap.
    tracked: u32,
    /// Hard cap on simultaneously allocated extents.
    limit: Option<u32>,
    /// Number of allocated extents.
    allocated: u32,
    /// Hint for next free extent search.
    next_search_hint: u32,
}

impl Default for ExtentPool {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl ExtentPool {
    /// Number of ids the bitmap grows by when an unbounded pool runs full.
    const GROWTH_STEP: u32 = 64;

    /// Create a pool that grows on demand.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_tracked(Self::GROWTH_STEP, None)
    }

    /// Create a pool that hands out at most `limit` extents at a time.
    #[must_use]
    pub fn bounded(limit: u32) -> Self {
        Self::with_tracked(limit, Some(limit))
    }

    fn with_tracked(tracked: u32, limit: Option<u32>) -> Self {
        Self {
            bitmap: vec![0u8; (tracked as usize).div_ceil(BITS_PER_BYTE)],
            tracked,
            limit,
            allocated: 0,
            next_search_hint: 0,
        }
    }

    /// Number of extents currently handed out.
    #[must_use]
    pub const fn allocated_count(&self) -> u32 {
        self.allocated
    }

    /// The cap on allocated extents, if any.
    #[must_use]
    pub const fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Check if an extent id is currently handed out.
    #[must_use]
    pub fn is_allocated(&self, id: ExtentId) -> bool {
        id < self.tracked && get_bit(&self.bitmap, id as usize)
    }

    /// Grow the bitmap to track `new_tracked` ids.
    fn expand(&mut self, new_tracked: u32) {
        if new_tracked <= self.tracked {
            return;
        }
        self.bitmap
            .resize((new_tracked as usize).div_ceil(BITS_PER_BYTE), 0);
        self.tracked = new_tracked;
    }

    /// Find a clear bit, searching from the hint and wrapping around.
    fn find_free(&self) -> Option<ExtentId> {
        (self.next_search_hint..self.tracked)
            .chain(0..self.next_search_hint)
            .find(|&id| !get_bit(&self.bitmap, id as usize))
    }
}

impl ExtentAllocator for ExtentPool {
    fn allocate(&mut self) -> Option<ExtentId> {
        if self.limit.is_some_and(|limit| self.allocated >= limit) {
            return None;
        }
        if self.allocated >= self.tracked {
            let grown = self.tracked.checked_add(Self::GROWTH_STEP)?;
            self.expand(grown);
        }

        let id = self.find_free()?;
        set_bit(&mut self.bitmap, id as usize);
        self.allocated += 1;
        self.next_search_hint = id + 1;
        Some(id)
    }

    fn free(&mut self, id: ExtentId) {
        debug_assert!(self.is_allocated(id), "extent {id} is not allocated");
        if !self.is_allocated(id) {
            return;
        }
        clear_bit(&mut self.bitmap, id as usize);
        self.allocated -= 1;
        if id < self.next_search_hint {
            self.next_search_hint = id;
        }
    }
}

/// Get a bit from the bitmap.
fn get_bit(bitmap: &[u8], index: usize) -> bool {
    let byte = index / BITS_PER_BYTE;
    let bit = index % BITS_PER_BYTE;
    bitmap.get(byte).is_some_and(|b| b & (1 << bit) != 0)
}

/// Set a bit in the bitmap.
fn set_bit(bitmap: &mut [u8], index: usize) {
    let byte = index / BITS_PER_BYTE;
    let bit = index % BITS_PER_BYTE;
    if let Some(b) = bitmap.get_mut(byte) {
        *b |= 1 << bit;
    }
}

/// Clear a bit in the bitmap.
fn clear_bit(bitmap: &mut [u8], index: usize) {
    let byte = index / BITS_PER_BYTE;
    let bit = index % BITS_PER_BYTE;
    if let Some(b) = bitmap.get_mut(byte) {
        *b &= !(1 << bit);
    }
}
