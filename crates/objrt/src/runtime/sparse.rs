//! Three-level sparse array keyed by 24-bit indices.
//!
//! Backing store for per-class dispatch tables. A key splits into three
//! bytes, each indexing a 256-way level:
//!
//! ```text
//!   key = 0x00_AA_BB_CC
//!          root[AA] -> branch[BB] -> leaf[CC]
//! ```
//!
//! Levels are allocated only for populated branches; an absent level is
//! the empty marker and costs one `None` in its parent. Lookup is three
//! indexed loads with no probing.
//!
//! # Concurrency
//!
//! `SparseArray` is an ordinary owned value. Dispatch tables are built
//! privately and then published whole behind an `ArcSwap`, so a reader
//! either sees a finished array or the previous one, never a partially
//! linked branch.

use crate::error::{Error, Result};
use std::fmt;

/// Width of a sparse array key.
pub const KEY_BITS: u32 = 24;

const FANOUT: usize = 256;

#[inline]
fn split(key: u32) -> Option<(usize, usize, usize)> {
    if key >> KEY_BITS != 0 {
        return None;
    }
    Some((
        (key >> 16) as usize & 0xff,
        (key >> 8) as usize & 0xff,
        key as usize & 0xff,
    ))
}

#[derive(Clone)]
struct Leaf<T> {
    slots: [Option<T>; FANOUT],
    len: usize,
}

impl<T> Leaf<T> {
    fn new() -> Box<Self> {
        Box::new(Leaf {
            slots: std::array::from_fn(|_| None),
            len: 0,
        })
    }
}

#[derive(Clone)]
struct Branch<T> {
    leaves: [Option<Box<Leaf<T>>>; FANOUT],
    len: usize,
}

impl<T> Branch<T> {
    fn new() -> Box<Self> {
        Box::new(Branch {
            leaves: std::array::from_fn(|_| None),
            len: 0,
        })
    }
}

/// Sparse map from 24-bit keys to values.
///
/// # Example
///
/// ```rust
/// use objrt::runtime::SparseArray;
///
/// let mut array = SparseArray::new();
/// array.set(0x01_02_03, "greet").unwrap();
///
/// assert_eq!(array.get(0x01_02_03), Some(&"greet"));
/// assert_eq!(array.get(0x01_02_04), None);
/// assert_eq!(array.leaf_count(), 1);
/// ```
pub struct SparseArray<T> {
    roots: [Option<Box<Branch<T>>>; FANOUT],
    len: usize,
}

impl<T> SparseArray<T> {
    #[must_use]
    pub fn new() -> Self {
        SparseArray {
            roots: std::array::from_fn(|_| None),
            len: 0,
        }
    }

    /// Returns the entry at `key`. Keys wider than 24 bits are never present.
    #[inline]
    #[must_use]
    pub fn get(&self, key: u32) -> Option<&T> {
        let (i, j, k) = split(key)?;
        self.roots[i].as_ref()?.leaves[j].as_ref()?.slots[k].as_ref()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` at `key`, allocating intermediate levels as needed.
    /// Returns the value previously stored there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyOutOfRange`] if `key` does not fit in 24 bits.
    pub fn set(&mut self, key: u32, value: T) -> Result<Option<T>> {
        let (i, j, k) = split(key).ok_or(Error::KeyOutOfRange { key })?;

        let branch = self.roots[i].get_or_insert_with(Branch::new);
        let slot = &mut branch.leaves[j];
        if slot.is_none() {
            branch.len += 1;
        }
        let leaf = slot.get_or_insert_with(Leaf::new);

        let previous = leaf.slots[k].replace(value);
        if previous.is_none() {
            leaf.len += 1;
            self.len += 1;
        }
        Ok(previous)
    }

    /// Clears `key`, releasing any level left empty.
    pub fn remove(&mut self, key: u32) -> Option<T> {
        let (i, j, k) = split(key)?;
        let branch = self.roots[i].as_mut()?;
        let leaf = branch.leaves[j].as_mut()?;
        let previous = leaf.slots[k].take()?;

        leaf.len -= 1;
        self.len -= 1;
        if leaf.len == 0 {
            branch.leaves[j] = None;
            branch.len -= 1;
            if branch.len == 0 {
                self.roots[i] = None;
            }
        }
        Some(previous)
    }

    /// Number of populated keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated third-level nodes.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.roots.iter().flatten().map(|branch| branch.len).sum()
    }

    /// Populated entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.roots.iter().enumerate().flat_map(|(i, branch)| {
            branch.iter().flat_map(move |branch| {
                branch.leaves.iter().enumerate().flat_map(move |(j, leaf)| {
                    leaf.iter().flat_map(move |leaf| {
                        leaf.slots.iter().enumerate().filter_map(move |(k, slot)| {
                            // each index is below 256, so the key fits in 24 bits
                            #[allow(clippy::cast_possible_truncation)]
                            let key = ((i << 16) | (j << 8) | k) as u32;
                            slot.as_ref().map(|value| (key, value))
                        })
                    })
                })
            })
        })
    }
}

impl<T: Clone> SparseArray<T> {
    /// Produces an independent array holding the same entries as `other`.
    ///
    /// Every level is copied; the result shares no nodes with `other`.
    #[must_use]
    pub fn copy_from(other: &Self) -> Self {
        SparseArray {
            roots: other.roots.clone(),
            len: other.len,
        }
    }
}

impl<T: Clone> Clone for SparseArray<T> {
    fn clone(&self) -> Self {
        SparseArray::copy_from(self)
    }
}

impl<T> Default for SparseArray<T> {
    fn default() -> Self {
        SparseArray::new()
    }
}

impl<T> fmt::Debug for SparseArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseArray")
            .field("len", &self.len)
            .field("leaves", &self.leaf_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_array() {
        let array: SparseArray<u32> = SparseArray::new();
        assert!(array.is_empty());
        assert_eq!(array.get(0), None);
        assert_eq!(array.get(0x00ff_ffff), None);
        assert_eq!(array.leaf_count(), 0);
    }

    #[test]
    fn test_set_and_get_across_levels() {
        let mut array = SparseArray::new();
        let keys = [0, 1, 0xff, 0x100, 0xffff, 0x1_0000, 0x00ff_ffff];
        for (n, &key) in keys.iter().enumerate() {
            assert_eq!(array.set(key, n).unwrap(), None);
        }
        for (n, &key) in keys.iter().enumerate() {
            assert_eq!(array.get(key), Some(&n));
        }
        assert_eq!(array.len(), keys.len());
        assert_eq!(array.get(2), None);
    }

    #[test]
    fn test_overwrite_returns_previous() {
        let mut array = SparseArray::new();
        array.set(42, "first").unwrap();
        assert_eq!(array.set(42, "second").unwrap(), Some("first"));
        assert_eq!(array.get(42), Some(&"second"));
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn test_key_out_of_range() {
        let mut array = SparseArray::new();
        assert_eq!(
            array.set(1 << 24, 7),
            Err(Error::KeyOutOfRange { key: 1 << 24 })
        );
        assert_eq!(array.get(1 << 24), None);
        assert!(array.is_empty());
    }

    #[test]
    fn test_leaves_allocated_per_populated_branch() {
        let mut array = SparseArray::new();
        // same leaf
        array.set(0x01_02_00, 1).unwrap();
        array.set(0x01_02_ff, 2).unwrap();
        assert_eq!(array.leaf_count(), 1);
        // sibling leaf under the same branch
        array.set(0x01_03_00, 3).unwrap();
        assert_eq!(array.leaf_count(), 2);
        // different branch
        array.set(0x02_00_00, 4).unwrap();
        assert_eq!(array.leaf_count(), 3);
    }

    #[test]
    fn test_remove_releases_empty_levels() {
        let mut array = SparseArray::new();
        array.set(0x05_06_07, 'a').unwrap();
        array.set(0x05_06_08, 'b').unwrap();

        assert_eq!(array.remove(0x05_06_07), Some('a'));
        assert_eq!(array.leaf_count(), 1);
        assert_eq!(array.remove(0x05_06_08), Some('b'));
        assert_eq!(array.leaf_count(), 0);
        assert!(array.is_empty());
        assert_eq!(array.remove(0x05_06_08), None);
    }

    #[test]
    fn test_copy_is_independent() {
        let mut base = SparseArray::new();
        base.set(10, "base").unwrap();
        base.set(0x10_00_00, "far").unwrap();

        let mut derived = SparseArray::copy_from(&base);
        derived.set(10, "override").unwrap();
        derived.set(11, "extra").unwrap();

        assert_eq!(base.get(10), Some(&"base"));
        assert_eq!(base.get(11), None);
        assert_eq!(derived.get(10), Some(&"override"));
        assert_eq!(derived.get(0x10_00_00), Some(&"far"));
        assert_eq!(derived.len(), 3);
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_iter_in_key_order() {
        let mut array = SparseArray::new();
        for key in [0x00_ff_00, 3, 0x01_00_00, 1] {
            array.set(key, key * 2).unwrap();
        }
        let collected: Vec<_> = array.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(
            collected,
            vec![(1, 2), (3, 6), (0x00_ff_00, 0x01_fe_00), (0x01_00_00, 0x02_00_00)]
        );
    }
}
