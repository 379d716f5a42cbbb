//! Synchronized sections keyed by object identity.
//!
//! Each object that is currently entered, or waited on, owns one
//! [`RawRecursiveMutex`]. Entries are created on first entry and dropped
//! when the last thread leaves, so the table only holds objects in use.

use crate::error::{Error, Result};
use crate::runtime::mutex::RawRecursiveMutex;
use crate::runtime::object::ObjectPtr;
use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct SyncEntry {
    mutex: Arc<RawRecursiveMutex>,
    /// Threads holding or waiting for `mutex`, counting every recursion level.
    users: usize,
}

/// Per-object recursive locks.
///
/// # Example
///
/// ```rust
/// use objrt::runtime::{ObjectPtr, SyncTable};
///
/// let table = SyncTable::new();
/// let value = 5u32;
/// let object = ObjectPtr::from_ref(&value);
///
/// table.enter(object).unwrap();
/// table.enter(object).unwrap();
/// table.exit(object).unwrap();
/// table.exit(object).unwrap();
/// assert!(table.exit(object).is_err());
/// ```
#[derive(Default)]
pub struct SyncTable {
    entries: Mutex<HashMap<usize, SyncEntry, FxBuildHasher>>,
}

impl SyncTable {
    #[must_use]
    pub fn new() -> Self {
        SyncTable::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<usize, SyncEntry, FxBuildHasher>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enters the section for `object`, blocking while another thread is
    /// inside it. Entering a null object does nothing.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; the `Result` mirrors [`exit`](Self::exit).
    pub fn enter(&self, object: ObjectPtr) -> Result<()> {
        if object.is_null() {
            return Ok(());
        }

        let mutex = {
            let mut entries = self.entries();
            let entry = entries.entry(object.addr()).or_insert_with(|| SyncEntry {
                mutex: Arc::new(RawRecursiveMutex::new()),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.mutex)
        };

        // block outside the table lock
        mutex.lock();
        Ok(())
    }

    /// Leaves one level of the section for `object`. Exiting a null object
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SyncNotEntered`] if no thread entered `object`, and
    /// [`Error::MutexNotOwned`] if another thread holds it.
    pub fn exit(&self, object: ObjectPtr) -> Result<()> {
        if object.is_null() {
            return Ok(());
        }

        let mut entries = self.entries();
        let entry = entries
            .get_mut(&object.addr())
            .ok_or(Error::SyncNotEntered)?;

        entry.mutex.unlock().map_err(|error| match error {
            Error::MutexNotLocked => Error::SyncNotEntered,
            other => other,
        })?;

        entry.users -= 1;
        if entry.users == 0 {
            entries.remove(&object.addr());
        }
        Ok(())
    }

    /// Runs `f` inside the section for `object`.
    ///
    /// The section is left even if `f` panics.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`enter`](Self::enter).
    pub fn synchronized<R>(&self, object: ObjectPtr, f: impl FnOnce() -> R) -> Result<R> {
        struct Exit<'a> {
            table: &'a SyncTable,
            object: ObjectPtr,
        }

        impl Drop for Exit<'_> {
            fn drop(&mut self) {
                if let Err(error) = self.table.exit(self.object) {
                    crate::error::fatal(&error);
                }
            }
        }

        self.enter(object)?;
        let _exit = Exit {
            table: self,
            object,
        };
        Ok(f())
    }

    /// Number of objects currently entered or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTable")
            .field("entered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_null_object_is_a_noop() {
        let table = SyncTable::new();
        table.enter(ObjectPtr::null()).unwrap();
        table.exit(ObjectPtr::null()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_entry_released_after_last_exit() {
        let table = SyncTable::new();
        let value = 0u8;
        let object = ObjectPtr::from_ref(&value);

        table.enter(object).unwrap();
        table.enter(object).unwrap();
        assert_eq!(table.len(), 1);
        table.exit(object).unwrap();
        assert_eq!(table.len(), 1);
        table.exit(object).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_exit_without_enter() {
        let table = SyncTable::new();
        let value = 0u8;
        assert_eq!(
            table.exit(ObjectPtr::from_ref(&value)),
            Err(Error::SyncNotEntered)
        );
    }

    #[test]
    fn test_exit_by_other_thread() {
        let table = Arc::new(SyncTable::new());
        let value = Box::new(0u8);
        let object = ObjectPtr::from_ref(&*value);
        table.enter(object).unwrap();

        let other = Arc::clone(&table);
        let result = thread::spawn(move || other.exit(object)).join().unwrap();
        assert_eq!(result, Err(Error::MutexNotOwned));

        table.exit(object).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_sections_exclude_each_other() {
        let table = Arc::new(SyncTable::new());
        let counter = Arc::new(Mutex::new(0usize));
        let shared = Box::new(0u64);
        let object = ObjectPtr::from_ref(&*shared);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..200 {
                        table
                            .synchronized(object, || {
                                let mut guard = counter.try_lock().expect("section not exclusive");
                                *guard += 1;
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 800);
        assert!(table.is_empty());
    }
}
