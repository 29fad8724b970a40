//! In-block search.
//!
//! Every function returns a position in `0..=elems.len()` and whether an
//! equal element was seen. Binary and linear mode give identical results.

use std::cmp::Ordering;

use super::order::Comparator;
use crate::config::SearchMode;

/// First position whose element is not less than `key`.
pub(crate) fn lower_bound_key<C: Comparator>(
    cmp: &C,
    elems: &[C::Elem],
    key: &C::Key,
    mode: SearchMode,
) -> (usize, bool) {
    let pos = find(elems, mode, |e| cmp.compare_key(e, key) != Ordering::Less);
    let exact = elems
        .get(pos)
        .is_some_and(|e| cmp.compare_key(e, key) == Ordering::Equal);
    (pos, exact)
}

/// First position whose element is greater than `key`.
///
/// The flag reports whether the element just before that position equals `key`.
pub(crate) fn upper_bound_key<C: Comparator>(
    cmp: &C,
    elems: &[C::Elem],
    key: &C::Key,
    mode: SearchMode,
) -> (usize, bool) {
    let pos = find(elems, mode, |e| cmp.compare_key(e, key) == Ordering::Greater);
    let exact = pos
        .checked_sub(1)
        .and_then(|before| elems.get(before))
        .is_some_and(|e| cmp.compare_key(e, key) == Ordering::Equal);
    (pos, exact)
}

/// First position whose element is not less than `elem`.
pub(crate) fn lower_bound_elem<C: Comparator>(
    cmp: &C,
    elems: &[C::Elem],
    elem: &C::Elem,
    mode: SearchMode,
) -> (usize, bool) {
    let pos = find(elems, mode, |e| cmp.compare(e, elem) != Ordering::Less);
    let exact = elems
        .get(pos)
        .is_some_and(|e| cmp.compare(e, elem) == Ordering::Equal);
    (pos, exact)
}

/// First position where `reached` holds; `reached` must be monotone over `elems`.
fn find<E>(elems: &[E], mode: SearchMode, reached: impl Fn(&E) -> bool) -> usize {
    match mode {
        SearchMode::Binary => elems.partition_point(|e| !reached(e)),
        SearchMode::Linear => elems.iter().position(reached).unwrap_or(elems.len()),
    }
}
