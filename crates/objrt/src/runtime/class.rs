//! Class records for the `objrt` runtime.
//!
//! A class has two sides, the instance side and the metaclass, each
//! with its own [`ClassState`] and dispatch table. The parts of a class
//! that message sends read (state, superclass link, dispatch tables)
//! live in a shared [`ClassInner`] and are read without taking the
//! registry lock. Method lists and attached categories belong to the
//! registry and only change under its lock.
//!
//! # Inheritance
//!
//! Superclasses are declared by name and linked when the class reaches
//! `Setup`. The link is a `Weak` back-reference; the registry owns every
//! class for the life of the runtime, so upgrading it never fails once
//! set. The metaclass of a class inherits from the superclass's
//! metaclass, and the root metaclass inherits from the root class.

use crate::runtime::object::{Imp, ObjectPtr};
use crate::runtime::selector::Sel;
use crate::runtime::sparse::SparseArray;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Per-class dispatch table: selector id to implementation.
pub type DispatchTable = SparseArray<Imp>;

/// Lifecycle of one side of a class. Transitions only move forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassState {
    Unregistered = 0,
    /// Descriptor recorded and name indexed.
    Registered = 1,
    /// Superclass chain resolved and instance size final.
    Setup = 2,
    /// Pending categories merged.
    Loaded = 3,
    /// One-time class initialization has run.
    Initialized = 4,
}

impl ClassState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ClassState::Unregistered,
            1 => ClassState::Registered,
            2 => ClassState::Setup,
            3 => ClassState::Loaded,
            _ => ClassState::Initialized,
        }
    }
}

/// A method as stored in a class or category: selector plus implementation.
#[derive(Clone, Copy)]
pub struct Method {
    pub selector: Sel,
    pub imp: Imp,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("selector", &self.selector)
            .field("imp", &format!("{:p}", self.imp as *const ()))
            .finish()
    }
}

pub(crate) struct Side {
    state: AtomicU8,
    dtable: ArcSwapOption<DispatchTable>,
}

impl Side {
    fn new() -> Self {
        Side {
            state: AtomicU8::new(ClassState::Registered as u8),
            dtable: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn state(&self) -> ClassState {
        ClassState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `to` unless already at or past it. Returns whether it moved.
    pub(crate) fn advance(&self, to: ClassState) -> bool {
        self.state.fetch_max(to as u8, Ordering::AcqRel) < to as u8
    }

    /// Single lookup in the published table, without bumping its refcount.
    #[inline]
    pub(crate) fn lookup(&self, sel: Sel) -> Option<Imp> {
        let table = self.dtable.load();
        (*table).as_ref()?.get(sel.id()).copied()
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<DispatchTable>> {
        self.dtable.load_full()
    }

    pub(crate) fn has_table(&self) -> bool {
        self.dtable.load().is_some()
    }

    pub(crate) fn publish(&self, table: DispatchTable) -> Arc<DispatchTable> {
        let table = Arc::new(table);
        self.dtable.store(Some(Arc::clone(&table)));
        table
    }
}

pub(crate) struct ClassInner {
    pub(crate) id: usize,
    pub(crate) name: Arc<str>,
    pub(crate) superclass_name: Option<Arc<str>>,
    superclass: OnceLock<Weak<ClassInner>>,
    declared_size: usize,
    instance_size: AtomicUsize,
    pub(crate) instance: Side,
    pub(crate) meta: Side,
    /// Token of the thread running `initialize`, 0 otherwise.
    pub(crate) initializing: AtomicU64,
}

impl ClassInner {
    pub(crate) fn new(
        id: usize,
        name: Arc<str>,
        superclass_name: Option<Arc<str>>,
        declared_size: usize,
    ) -> Self {
        ClassInner {
            id,
            name,
            superclass_name,
            superclass: OnceLock::new(),
            declared_size,
            instance_size: AtomicUsize::new(declared_size),
            instance: Side::new(),
            meta: Side::new(),
            initializing: AtomicU64::new(0),
        }
    }

    /// Links the resolved superclass and finalizes the instance size.
    pub(crate) fn link_superclass(&self, superclass: Option<&Arc<ClassInner>>) {
        let base = superclass.map_or(0, |sup| sup.instance_size());
        if let Some(sup) = superclass {
            let _ = self.superclass.set(Arc::downgrade(sup));
        }
        self.instance_size
            .store(base + self.declared_size, Ordering::Release);
    }

    pub(crate) fn instance_size(&self) -> usize {
        self.instance_size.load(Ordering::Acquire)
    }

    pub(crate) fn resolved_superclass(&self) -> Option<Arc<ClassInner>> {
        self.superclass.get().and_then(Weak::upgrade)
    }

    pub(crate) fn side(&self, meta: bool) -> &Side {
        if meta {
            &self.meta
        } else {
            &self.instance
        }
    }
}

/// Handle to one side of a registered class.
///
/// Cheap to clone; equality is identity of the class and side.
///
/// # Example
///
/// ```rust
/// use objrt::runtime::{ClassDescriptor, ClassState, Runtime};
///
/// let runtime = Runtime::new();
/// let base = runtime.register_class(ClassDescriptor::root("Base")).unwrap();
/// let derived = runtime
///     .register_class(ClassDescriptor::new("Derived", "Base"))
///     .unwrap();
///
/// assert_eq!(derived.superclass(), Some(base.clone()));
/// assert!(derived.is_subclass_of(&base));
/// assert_eq!(derived.state(), ClassState::Loaded);
/// assert!(derived.metaclass().is_metaclass());
/// ```
#[derive(Clone)]
pub struct Class {
    pub(crate) inner: Arc<ClassInner>,
    meta: bool,
}

impl Class {
    pub(crate) fn instance_side(inner: Arc<ClassInner>) -> Self {
        Class { inner, meta: false }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn is_metaclass(&self) -> bool {
        self.meta
    }

    /// The metaclass of this class; a metaclass returns itself.
    #[must_use]
    pub fn metaclass(&self) -> Class {
        Class {
            inner: Arc::clone(&self.inner),
            meta: true,
        }
    }

    /// The instance side of this class; an instance side returns itself.
    #[must_use]
    pub fn instance_class(&self) -> Class {
        Class {
            inner: Arc::clone(&self.inner),
            meta: false,
        }
    }

    /// Declared superclass name, resolved or not.
    #[must_use]
    pub fn superclass_name(&self) -> Option<&str> {
        self.inner.superclass_name.as_deref()
    }

    /// Resolved superclass of this side. `None` for the root class and for
    /// any class that has not reached `Setup`.
    #[must_use]
    pub fn superclass(&self) -> Option<Class> {
        match (self.inner.resolved_superclass(), self.meta) {
            (Some(sup), meta) => Some(Class { inner: sup, meta }),
            (None, true) if self.state() >= ClassState::Setup => {
                Some(self.instance_class())
            }
            (None, _) => None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ClassState {
        self.side().state()
    }

    /// Instance size including all ancestors; final once the class is `Setup`.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.inner.instance_size()
    }

    /// Whether `other` is this class or one of its ancestors.
    #[must_use]
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if class == *other {
                return true;
            }
            current = class.superclass();
        }
        false
    }

    /// Snapshot of the currently published dispatch table.
    ///
    /// A snapshot never changes; later rebuilds publish a new table.
    #[must_use]
    pub fn dispatch_table(&self) -> Option<Arc<DispatchTable>> {
        self.side().snapshot()
    }

    /// Identity handle of this class object, used as the receiver for
    /// class-level sends.
    #[must_use]
    pub fn as_object(&self) -> ObjectPtr {
        ObjectPtr::from_ref(self.side())
    }

    pub(crate) fn id(&self) -> usize {
        self.inner.id
    }

    pub(crate) fn side(&self) -> &Side {
        self.inner.side(self.meta)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) && self.meta == other.meta
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name())
            .field("meta", &self.meta)
            .field("superclass", &self.superclass_name())
            .field("state", &self.state())
            .finish()
    }
}
