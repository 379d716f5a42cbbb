//! Error types for the `objrt` runtime.
//!
//! Core operations report failures as [`Error`] values so they can be
//! inspected and tested. Conditions the runtime cannot continue past
//! (an unresolvable superclass chain at a message send, an exhausted
//! selector space) are escalated through [`fatal`], which logs a
//! diagnostic and aborts the process.

use std::fmt;

/// Errors that can occur in the `objrt` runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Every 24-bit selector id has been handed out.
    OutOfSelectorSlots,

    /// A sparse array key does not fit in 24 bits.
    KeyOutOfRange {
        /// The rejected key.
        key: u32,
    },

    /// A class with this name is already registered.
    ClassAlreadyExists {
        /// The duplicated class name.
        name: String,
    },

    /// No class with this name is registered.
    ClassNotFound {
        /// The requested class name.
        name: String,
    },

    /// The superclass chain of a class names a class that never registered.
    UnresolvedSuperclass {
        /// The class whose chain is incomplete.
        class: String,
        /// The first missing ancestor.
        superclass: String,
    },

    /// The superclass chain of a class loops back on itself.
    InheritanceCycle {
        /// A class on the cycle.
        class: String,
    },

    /// A method lookup on a specific class found nothing.
    MethodNotFound {
        /// The class searched.
        class: String,
        /// The selector name.
        selector: String,
    },

    /// A recursive mutex was released by a thread that does not own it.
    MutexNotOwned,

    /// A recursive mutex was released while nobody held it.
    MutexNotLocked,

    /// A synchronized section was exited for an object that was never entered.
    SyncNotEntered,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfSelectorSlots => write!(f, "Out of selector slots"),
            Error::KeyOutOfRange { key } => {
                write!(f, "Sparse array key {key:#x} does not fit in 24 bits")
            }
            Error::ClassAlreadyExists { name } => {
                write!(f, "Class {name} is already registered")
            }
            Error::ClassNotFound { name } => {
                write!(f, "Class {name} is not registered")
            }
            Error::UnresolvedSuperclass { class, superclass } => {
                write!(
                    f,
                    "Class {class} has unresolved superclass {superclass}"
                )
            }
            Error::InheritanceCycle { class } => {
                write!(f, "Inheritance cycle through class {class}")
            }
            Error::MethodNotFound { class, selector } => {
                write!(
                    f,
                    "Selector {selector} is not implemented by class {class}"
                )
            }
            Error::MutexNotOwned => {
                write!(f, "Mutex released by a thread that does not own it")
            }
            Error::MutexNotLocked => {
                write!(f, "Mutex released while not locked")
            }
            Error::SyncNotEntered => {
                write!(f, "Synchronized section exited without matching enter")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `objrt` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reports `error` and aborts the process.
///
/// Used where the runtime would otherwise dispatch against undefined
/// state. With the `fatal_backtrace` feature the current backtrace is
/// logged as well.
#[cold]
pub fn fatal(error: &Error) -> ! {
    objrt_log::error!("{error}");

    #[cfg(feature = "fatal_backtrace")]
    {
        let trace = backtrace::Backtrace::new();
        objrt_log::error!("{trace:?}");
    }

    std::process::abort()
}
