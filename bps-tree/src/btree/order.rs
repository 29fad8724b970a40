//! Element ordering.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

/// Three-way comparison of stored elements and of elements against keys.
///
/// The comparator value is the tree's comparison context: anything it
/// needs to order elements (collation, field offsets) lives in `self`.
/// Elements must be totally ordered by [`Comparator::compare`], and
/// `compare_key` must agree with that order.
pub trait Comparator {
    /// Fixed-size stored value.
    type Elem: Copy;
    /// Search key; never stored.
    type Key: ?Sized;

    /// Order two elements.
    fn compare(&self, a: &Self::Elem, b: &Self::Elem) -> Ordering;

    /// Order an element against a search key.
    fn compare_key(&self, elem: &Self::Elem, key: &Self::Key) -> Ordering;
}

/// Orders any `Ord + Copy` type by its natural order; the key is the element type itself.
pub struct NaturalOrder<T>(PhantomData<fn() -> T>);

impl<T> NaturalOrder<T> {
    /// Create the comparator.
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for NaturalOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::expl_impl_clone_on_copy)] // derive would demand T: Clone
impl<T> Clone for NaturalOrder<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NaturalOrder<T> {}

impl<T> fmt::Debug for NaturalOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NaturalOrder")
    }
}

impl<T: Ord + Copy> Comparator for NaturalOrder<T> {
    type Elem = T;
    type Key = T;

    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }

    fn compare_key(&self, elem: &T, key: &T) -> Ordering {
        elem.cmp(key)
    }
}
