//! Core runtime: selectors, classes, categories and message dispatch.
//!
//! A [`Runtime`] owns one selector table, one class registry guarded by
//! a recursive lock, and one table of synchronized sections. Most
//! programs use the process-wide instance from [`global`]; tests build
//! private ones.
//!
//! # Example
//!
//! ```rust
//! use objrt::runtime::{CategoryDescriptor, ClassDescriptor, ObjectPtr, Runtime, Sel};
//!
//! unsafe extern "C" fn one(_: ObjectPtr, _: Sel, _: *const *mut u8, ret: *mut u8) {
//!     unsafe { ret.cast::<usize>().write_unaligned(1) };
//! }
//! unsafe extern "C" fn two(_: ObjectPtr, _: Sel, _: *const *mut u8, ret: *mut u8) {
//!     unsafe { ret.cast::<usize>().write_unaligned(2) };
//! }
//!
//! let runtime = Runtime::new();
//! let base = runtime
//!     .register_class(ClassDescriptor::root("Base").with_method("value", one))
//!     .unwrap();
//! let sel = runtime.register_selector("value", None).unwrap();
//!
//! let call = |imp: objrt::runtime::Imp| {
//!     let mut out = 0usize;
//!     unsafe { imp(ObjectPtr::null(), sel, std::ptr::null(), (&raw mut out).cast()) };
//!     out
//! };
//! assert_eq!(call(runtime.msg_lookup(&base, sel)), 1);
//!
//! // a category attached later overrides the class
//! runtime
//!     .register_category(CategoryDescriptor::new("Two", "Base").with_method("value", two))
//!     .unwrap();
//! assert_eq!(call(runtime.msg_lookup(&base, sel)), 2);
//! ```

mod category;
mod class;
mod descriptor;
mod dispatch;
mod dtable;
mod mutex;
mod object;
mod registry;
mod selector;
mod sparse;
mod sync;

pub use category::Category;
pub use class::{Class, ClassState, DispatchTable, Method};
pub use descriptor::{
    CategoryDescriptor, ClassDescriptor, MethodDescriptor, ModuleDescriptor, SelectorDescriptor,
};
pub use dispatch::ForwardHandler;
pub use mutex::{RawRecursiveMutex, RecursiveMutex, RecursiveMutexGuard};
pub use object::{Imp, ObjectPtr};
pub use selector::{MAX_SELECTORS, Sel, SelectorInfo, SelectorTable};
pub use sparse::{KEY_BITS, SparseArray};
pub use sync::SyncTable;

use crate::config::RuntimeConfig;
use crate::error::{Result, fatal};
use registry::RegistryState;
use std::cell::RefCell;
use std::fmt;
use std::sync::{OnceLock, RwLock};

/// An independent runtime instance.
pub struct Runtime {
    config: RuntimeConfig,
    selectors: SelectorTable,
    registry: RecursiveMutex<RefCell<RegistryState>>,
    forward: RwLock<Option<ForwardHandler>>,
    sync: SyncTable,
    load_sel: Sel,
    initialize_sel: Sel,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Runtime::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with `config`.
    ///
    /// The logger is process-wide, so a `log_level` in `config` changes
    /// logging for every runtime in the process, not just this one.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        if let Some(level) = config.log_level {
            objrt_log::set_level(level);
        }

        let selectors = SelectorTable::new(config.bucket_count(), config.selector_load_factor);
        // the first two ids of a fresh table are always available
        let load_sel = selectors
            .intern("load", None)
            .unwrap_or_else(|error| fatal(&error));
        let initialize_sel = selectors
            .intern("initialize", None)
            .unwrap_or_else(|error| fatal(&error));

        Runtime {
            config,
            selectors,
            registry: RecursiveMutex::new(RefCell::new(RegistryState::default())),
            forward: RwLock::new(None),
            sync: SyncTable::new(),
            load_sel,
            initialize_sel,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn selectors(&self) -> &SelectorTable {
        &self.selectors
    }

    /// Selector sent to a class and its categories when the class loads.
    #[must_use]
    pub fn load_selector(&self) -> Sel {
        self.load_sel
    }

    /// Selector sent to a class before its first message.
    #[must_use]
    pub fn initialize_selector(&self) -> Sel {
        self.initialize_sel
    }

    /// Enters the synchronized section for `object`.
    ///
    /// # Errors
    ///
    /// See [`SyncTable::enter`].
    pub fn sync_enter(&self, object: ObjectPtr) -> Result<()> {
        self.sync.enter(object)
    }

    /// Leaves the synchronized section for `object`.
    ///
    /// # Errors
    ///
    /// See [`SyncTable::exit`].
    pub fn sync_exit(&self, object: ObjectPtr) -> Result<()> {
        self.sync.exit(object)
    }

    /// Runs `f` inside the synchronized section for `object`.
    ///
    /// # Errors
    ///
    /// See [`SyncTable::synchronized`].
    pub fn synchronized<R>(&self, object: ObjectPtr, f: impl FnOnce() -> R) -> Result<R> {
        self.sync.synchronized(object, f)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("selectors", &self.selectors)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// The process-wide runtime, created with the default configuration on
/// first use.
pub fn global() -> &'static Runtime {
    GLOBAL.get_or_init(Runtime::new)
}

/// Creates the process-wide runtime with `config`.
///
/// Has no effect on the configuration if the global runtime already
/// exists; the existing instance is returned either way.
pub fn init_global(config: RuntimeConfig) -> &'static Runtime {
    GLOBAL.get_or_init(|| Runtime::with_config(config))
}
