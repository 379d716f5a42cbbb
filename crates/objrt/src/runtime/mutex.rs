//! Owner-tracking recursive mutex.
//!
//! The runtime takes one of these around every registry mutation, and
//! the same primitive backs `@synchronized`-style sections keyed by
//! object identity. The owning thread may acquire it again without
//! blocking; each acquisition needs a matching release.
//!
//! State is an owner token, a recursion count, and an OS mutex plus
//! condition variable that park contending threads. Releasing from a
//! thread that is not the owner, or releasing an unlocked mutex, is
//! reported as an error instead of being ignored.

use crate::error::{Error, Result};
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Small nonzero identifier of the calling thread, stable for its lifetime.
pub(crate) fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| {
        let mut value = token.get();
        if value == 0 {
            value = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
            token.set(value);
        }
        value
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct State {
    /// 0 when unowned.
    owner: u64,
    count: usize,
}

/// Recursive mutex without associated data.
///
/// Lock and unlock are separate calls, which suits callers whose
/// release happens in a different frame than the acquisition.
///
/// # Example
///
/// ```rust
/// use objrt::runtime::RawRecursiveMutex;
///
/// let mutex = RawRecursiveMutex::new();
/// mutex.lock();
/// mutex.lock();
/// mutex.unlock().unwrap();
/// mutex.unlock().unwrap();
///
/// // a third release has nothing to match
/// assert!(mutex.unlock().is_err());
/// ```
pub struct RawRecursiveMutex {
    state: Mutex<State>,
    available: Condvar,
}

impl RawRecursiveMutex {
    #[must_use]
    pub const fn new() -> Self {
        RawRecursiveMutex {
            state: Mutex::new(State { owner: 0, count: 0 }),
            available: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // State is two plain integers updated together; a panic can't
        // leave them torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the mutex, blocking unless the caller already owns it.
    pub fn lock(&self) {
        let me = current_thread_token();
        let mut state = self.state();

        if state.owner == me {
            state.count += 1;
            return;
        }

        while state.owner != 0 {
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = me;
        state.count = 1;
    }

    /// Acquires the mutex if it is free or already owned by the caller.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        let me = current_thread_token();
        let mut state = self.state();

        if state.owner == me {
            state.count += 1;
            true
        } else if state.owner == 0 {
            state.owner = me;
            state.count = 1;
            true
        } else {
            false
        }
    }

    /// Releases one level of ownership, waking a waiter after the last one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutexNotLocked`] if nobody holds the mutex and
    /// [`Error::MutexNotOwned`] if another thread holds it.
    pub fn unlock(&self) -> Result<()> {
        let me = current_thread_token();
        let mut state = self.state();

        if state.owner == 0 || state.count == 0 {
            return Err(Error::MutexNotLocked);
        }
        if state.owner != me {
            return Err(Error::MutexNotOwned);
        }

        state.count -= 1;
        if state.count == 0 {
            state.owner = 0;
            drop(state);
            self.available.notify_one();
        }
        Ok(())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state().owner != 0
    }

    #[must_use]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.state().owner == current_thread_token()
    }

    /// Recursion depth held by the calling thread, 0 if it is not the owner.
    #[must_use]
    pub fn recursion_count(&self) -> usize {
        let state = self.state();
        if state.owner == current_thread_token() {
            state.count
        } else {
            0
        }
    }
}

impl Default for RawRecursiveMutex {
    fn default() -> Self {
        RawRecursiveMutex::new()
    }
}

impl fmt::Debug for RawRecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.state();
        f.debug_struct("RawRecursiveMutex")
            .field("owner", &state.owner)
            .field("count", &state.count)
            .finish()
    }
}

/// Recursive mutex guarding a value.
///
/// Guards only hand out shared references because the owner may hold
/// several at once; wrap the data in a `RefCell` for mutation.
pub struct RecursiveMutex<T: ?Sized> {
    raw: RawRecursiveMutex,
    data: T,
}

// SAFETY: the data is only reachable through a guard, and guards exist
// on a single thread at a time (the owner), so T moving between threads
// is all that is required.
unsafe impl<T: ?Sized + Send> Send for RecursiveMutex<T> {}
// SAFETY: as above; concurrent access from different threads is
// serialized by `raw`.
unsafe impl<T: ?Sized + Send> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    pub const fn new(data: T) -> Self {
        RecursiveMutex {
            raw: RawRecursiveMutex::new(),
            data,
        }
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: ?Sized> RecursiveMutex<T> {
    pub fn lock(&self) -> RecursiveMutexGuard<'_, T> {
        self.raw.lock();
        RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<RecursiveMutexGuard<'_, T>> {
        self.raw.try_lock().then(|| RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    #[must_use]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.raw.is_owned_by_current_thread()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RecursiveMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveMutex")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Scoped ownership of a [`RecursiveMutex`]. Not `Send`: it must be
/// released on the thread that acquired it.
pub struct RecursiveMutexGuard<'a, T: ?Sized> {
    mutex: &'a RecursiveMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.mutex.data
    }
}

impl<T: ?Sized> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(error) = self.mutex.raw.unlock() {
            crate::error::fatal(&error);
        }
    }
}
