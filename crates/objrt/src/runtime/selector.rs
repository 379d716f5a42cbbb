//! Selector interning for the `objrt` runtime.
//!
//! A selector is the runtime identity of an operation name plus its
//! optional type encoding. Interning hands out dense, never-reused
//! 32-bit ids starting at zero; the id doubles as the key into every
//! class's sparse dispatch table, so ids are capped at 24 bits.
//!
//! # Architecture
//!
//! The table is a bucket array of collision lists:
//! - Bucket index is `hash & (buckets - 1)` where `hash` is the `FxHash`
//!   of the name only
//! - The type encoding takes part in identity, so two selectors with the
//!   same name and different encodings share a bucket and are told apart
//!   by a second comparison
//! - The bucket array doubles and rehashes once the configured load
//!   factor is exceeded; stored hashes make rehashing string-free
//!
//! # Thread Safety
//!
//! Lookups take the read lock; a miss upgrades to the write lock and
//! re-checks before inserting, so concurrent interning of one name
//! always yields one id. The table has its own lock and never contends
//! with class registration.

use crate::error::{Error, Result};
use fxhash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

/// Number of distinct selector ids; the sparse dispatch key width.
pub const MAX_SELECTORS: u32 = 1 << 24;

/// Interned selector id.
///
/// Two `Sel`s are equal exactly when they were interned from the same
/// name and type encoding in the same [`SelectorTable`].
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sel(u32);

impl Sel {
    /// The raw id, always below [`MAX_SELECTORS`].
    #[inline]
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Sel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sel({})", self.0)
    }
}

/// Canonical strings behind a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorInfo {
    pub name: Arc<str>,
    /// Opaque type encoding, passed through unmodified.
    pub types: Option<Arc<str>>,
}

struct Entry {
    info: SelectorInfo,
    hash: u64,
}

impl Entry {
    fn matches(&self, hash: u64, name: &str, types: Option<&str>) -> bool {
        self.hash == hash
            && &*self.info.name == name
            && self.info.types.as_deref() == types
    }
}

struct Table {
    /// Collision lists of selector ids.
    buckets: Vec<Vec<u32>>,
    /// Indexed by selector id.
    entries: Vec<Entry>,
}

impl Table {
    fn find(&self, hash: u64, name: &str, types: Option<&str>) -> Option<Sel> {
        let mask = self.buckets.len() - 1;
        self.buckets[(hash as usize) & mask]
            .iter()
            .copied()
            .find(|&id| self.entries[id as usize].matches(hash, name, types))
            .map(Sel)
    }

    fn grow(&mut self) {
        let capacity = self.buckets.len() * 2;
        let mask = capacity - 1;
        let mut buckets = vec![Vec::new(); capacity];
        for (id, entry) in self.entries.iter().enumerate() {
            // ids are bounded by MAX_SELECTORS
            #[allow(clippy::cast_possible_truncation)]
            buckets[(entry.hash as usize) & mask].push(id as u32);
        }
        self.buckets = buckets;
    }
}

/// Process-lifetime selector registry.
///
/// # Example
///
/// ```rust
/// use objrt::runtime::SelectorTable;
///
/// let table = SelectorTable::new(16, (3, 4));
/// let a = table.intern("greet", Some("v@:")).unwrap();
/// let b = table.intern("greet", Some("v@:")).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(&*table.resolve(a).unwrap().name, "greet");
/// ```
pub struct SelectorTable {
    table: RwLock<Table>,
    load_factor: (usize, usize),
    limit: u32,
}

impl SelectorTable {
    /// Creates an empty table with `buckets` initial buckets (rounded up
    /// to a power of two) and growth ratio `load_factor`.
    #[must_use]
    pub fn new(buckets: usize, load_factor: (usize, usize)) -> Self {
        Self::with_limit(buckets, load_factor, MAX_SELECTORS)
    }

    pub(crate) fn with_limit(
        buckets: usize,
        load_factor: (usize, usize),
        limit: u32,
    ) -> Self {
        let buckets = buckets.max(1).next_power_of_two();
        SelectorTable {
            table: RwLock::new(Table {
                buckets: vec![Vec::new(); buckets],
                entries: Vec::new(),
            }),
            load_factor,
            limit: limit.min(MAX_SELECTORS),
        }
    }

    fn hash_name(name: &str) -> u64 {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the selector for `(name, types)`, interning it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfSelectorSlots`] once every 24-bit id is taken.
    pub fn intern(&self, name: &str, types: Option<&str>) -> Result<Sel> {
        let hash = Self::hash_name(name);

        {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sel) = table.find(hash, name, types) {
                return Ok(sel);
            }
        }

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);

        // another thread may have won the race for the write lock
        if let Some(sel) = table.find(hash, name, types) {
            return Ok(sel);
        }

        let id = u32::try_from(table.entries.len())
            .ok()
            .filter(|&id| id < self.limit)
            .ok_or(Error::OutOfSelectorSlots)?;

        table.entries.push(Entry {
            info: SelectorInfo {
                name: Arc::from(name),
                types: types.map(Arc::from),
            },
            hash,
        });
        let mask = table.buckets.len() - 1;
        table.buckets[(hash as usize) & mask].push(id);

        let (num, den) = self.load_factor;
        if table.entries.len() * den > table.buckets.len() * num {
            table.grow();
            objrt_log::trace!(
                "selector table grew to {} buckets",
                table.buckets.len()
            );
        }

        Ok(Sel(id))
    }

    /// Finds an already-interned selector without creating one.
    #[must_use]
    pub fn lookup(&self, name: &str, types: Option<&str>) -> Option<Sel> {
        let hash = Self::hash_name(name);
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(hash, name, types)
    }

    /// Returns the canonical strings for `sel`, or `None` if `sel` did not
    /// come from this table.
    #[must_use]
    pub fn resolve(&self, sel: Sel) -> Option<SelectorInfo> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(sel.0 as usize)
            .map(|entry| entry.info.clone())
    }

    /// Selector name, or `"<unknown>"` for foreign ids. Meant for diagnostics.
    #[must_use]
    pub fn name(&self, sel: Sel) -> Arc<str> {
        self.resolve(sel)
            .map_or_else(|| Arc::from("<unknown>"), |info| info.name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .len()
    }
}

impl Default for SelectorTable {
    fn default() -> Self {
        SelectorTable::new(64, (3, 4))
    }
}

impl fmt::Debug for SelectorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorTable")
            .field("len", &self.len())
            .field("buckets", &self.bucket_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_selector_interning() {
        let table = SelectorTable::default();
        let a = table.intern("init", None).unwrap();
        let b = table.intern("init", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_ids_are_dense_and_ordered() {
        let table = SelectorTable::default();
        let ids: Vec<_> = ["alloc", "init", "dealloc"]
            .iter()
            .map(|name| table.intern(name, None).unwrap().id())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_type_encoding_disambiguates() {
        let table = SelectorTable::default();
        let plain = table.intern("count", Some("i@:")).unwrap();
        let wide = table.intern("count", Some("q@:")).unwrap();
        let untyped = table.intern("count", None).unwrap();

        assert_ne!(plain, wide);
        assert_ne!(plain, untyped);
        assert_eq!(table.intern("count", Some("q@:")).unwrap(), wide);
        assert_eq!(table.resolve(wide).unwrap().types.as_deref(), Some("q@:"));
        assert_eq!(table.resolve(untyped).unwrap().types, None);
    }

    #[test]
    fn test_lookup_does_not_intern() {
        let table = SelectorTable::default();
        assert!(table.lookup("missing", None).is_none());
        assert!(table.is_empty());

        let sel = table.intern("present", None).unwrap();
        assert_eq!(table.lookup("present", None), Some(sel));
    }

    #[test]
    fn test_growth_keeps_ids_stable() {
        let table = SelectorTable::new(4, (3, 4));
        let sels: Vec<_> = (0..200)
            .map(|i| table.intern(&format!("method{i}:"), None).unwrap())
            .collect();

        assert!(table.bucket_count() >= 256);
        for (i, sel) in sels.iter().enumerate() {
            assert_eq!(
                table.lookup(&format!("method{i}:"), None),
                Some(*sel)
            );
            assert_eq!(&*table.name(*sel), format!("method{i}:"));
        }
    }

    #[test]
    fn test_exhausted_id_space() {
        let table = SelectorTable::with_limit(4, (3, 4), 2);
        table.intern("a", None).unwrap();
        table.intern("b", None).unwrap();

        assert_eq!(table.intern("c", None), Err(Error::OutOfSelectorSlots));
        // existing selectors still resolve
        assert!(table.intern("a", None).is_ok());
    }

    #[test]
    fn test_resolve_foreign_id() {
        let table = SelectorTable::default();
        let other = SelectorTable::default();
        other.intern("x", None).unwrap();
        let foreign = other.intern("y", None).unwrap();

        assert!(table.resolve(foreign).is_none());
        assert_eq!(&*table.name(foreign), "<unknown>");
    }

    #[test]
    fn test_selector_thread_safety() {
        let table = Arc::new(SelectorTable::new(2, (3, 4)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let shared = table.intern(&format!("shared{i}"), None).unwrap();
                            table.intern(&format!("thread{t}_{i}"), None).unwrap();
                            shared
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        assert_eq!(table.len(), 50 + 8 * 50);
    }
}
