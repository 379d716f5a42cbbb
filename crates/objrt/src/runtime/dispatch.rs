//! Message dispatch.
//!
//! The fast path is a lock-free read of the receiver class's published
//! table. The registry lock is only taken the first time a class is
//! messaged, to finish its lifecycle and run `initialize`.

use crate::error::{Error, Result, fatal};
use crate::runtime::Runtime;
use crate::runtime::class::{Class, ClassState};
use crate::runtime::dtable;
use crate::runtime::mutex::current_thread_token;
use crate::runtime::object::{Imp, call_hook};
use crate::runtime::registry::run_hooks;
use crate::runtime::selector::Sel;
use objrt_log::{debug, trace};
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

/// Called when a message has no implementation. Returns the
/// implementation to invoke instead.
pub type ForwardHandler = fn(&Runtime, &Class, Sel) -> Imp;

fn default_forward(runtime: &Runtime, class: &Class, sel: Sel) -> Imp {
    fatal(&Error::MethodNotFound {
        class: class.name().to_owned(),
        selector: runtime.selectors.name(sel).to_string(),
    })
}

impl Runtime {
    /// Finds the implementation of `sel` for instances of `class` (or for
    /// the class itself when `class` is a metaclass).
    ///
    /// The first dispatch to a class finishes its setup, builds its tables
    /// and runs `initialize`, superclasses first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedSuperclass`] or [`Error::InheritanceCycle`]
    /// if the class can never be set up, and [`Error::ClassNotFound`] if the
    /// class belongs to another runtime.
    ///
    /// # Example
    ///
    /// ```rust
    /// use objrt::runtime::{ClassDescriptor, ObjectPtr, Runtime, Sel};
    ///
    /// unsafe extern "C" fn hash(_: ObjectPtr, _: Sel, _: *const *mut u8, ret: *mut u8) {
    ///     unsafe { ret.cast::<usize>().write_unaligned(7) };
    /// }
    ///
    /// let runtime = Runtime::new();
    /// let class = runtime
    ///     .register_class(ClassDescriptor::root("Object").with_method("hash", hash))
    ///     .unwrap();
    ///
    /// let sel = runtime.register_selector("hash", None).unwrap();
    /// assert!(runtime.dispatch(&class, sel).unwrap().is_some());
    ///
    /// let other = runtime.register_selector("missing", None).unwrap();
    /// assert!(runtime.dispatch(&class, other).unwrap().is_none());
    /// ```
    pub fn dispatch(&self, class: &Class, sel: Sel) -> Result<Option<Imp>> {
        if class.inner.instance.state() < ClassState::Initialized {
            self.initialize(class)?;
        }

        let mut current = Some(class.clone());
        while let Some(class) = current {
            if let Some(imp) = class.side().lookup(sel) {
                return Ok(Some(imp));
            }
            current = class.superclass();
        }
        Ok(None)
    }

    /// Like [`dispatch`](Self::dispatch), but never reports "not found":
    /// a miss goes to the forward handler, and an error aborts.
    ///
    /// This is the entry point for compiled message sends.
    pub fn msg_lookup(&self, class: &Class, sel: Sel) -> Imp {
        match self.dispatch(class, sel) {
            Ok(Some(imp)) => imp,
            Ok(None) => {
                let handler = self.forward_handler();
                trace!(
                    "forwarding {} sent to {}",
                    self.selectors.name(sel),
                    class.name()
                );
                handler(self, class, sel)
            }
            Err(error) => fatal(&error),
        }
    }

    /// Whether a dispatch of `sel` to `class` finds an implementation.
    #[must_use]
    pub fn responds_to(&self, class: &Class, sel: Sel) -> bool {
        matches!(self.dispatch(class, sel), Ok(Some(_)))
    }

    /// Brings `class` and its superclasses to `Initialized` without
    /// sending a message. Does nothing if the class is already there.
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    pub fn initialize_class(&self, class: &Class) -> Result<()> {
        if class.inner.instance.state() < ClassState::Initialized {
            self.initialize(class)?;
        }
        Ok(())
    }

    /// Installs the handler consulted by [`msg_lookup`](Self::msg_lookup)
    /// on a miss. The default handler logs the miss and aborts.
    pub fn set_forward_handler(&self, handler: ForwardHandler) {
        *self
            .forward
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Restores the aborting default handler.
    pub fn reset_forward_handler(&self) {
        *self
            .forward
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn forward_handler(&self) -> ForwardHandler {
        self.forward
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or(default_forward)
    }

    /// Brings `class` to `Initialized`.
    ///
    /// Runs under the registry lock so other threads wait for the
    /// initializer to finish. A send from inside the initializer on the
    /// same thread sees the class as usable and does not re-enter.
    fn initialize(&self, class: &Class) -> Result<()> {
        let inner = &class.inner;
        let me = current_thread_token();

        let registry = self.registry.lock();
        if inner.instance.state() >= ClassState::Initialized
            || inner.initializing.load(Ordering::Acquire) == me
        {
            return Ok(());
        }

        let mut hooks = Vec::new();
        {
            let mut state = registry.borrow_mut();
            let id = state.id_of(class)?;
            self.advance(&mut state, id, &mut hooks)?;
            dtable::ensure(&state, id, false)?;
            dtable::ensure(&state, id, true)?;
        }
        run_hooks(hooks);

        if let Some(superclass) = class.instance_class().superclass() {
            self.initialize(&superclass)?;
        }

        // a load hook may have messaged the class already
        if inner.instance.state() >= ClassState::Initialized {
            return Ok(());
        }

        inner.initializing.store(me, Ordering::Release);
        if let Some(imp) = class.metaclass().side().lookup(self.initialize_sel) {
            debug!("initializing class {}", class.name());
            call_hook(imp, class.instance_class().as_object(), self.initialize_sel);
        }
        inner.instance.advance(ClassState::Initialized);
        inner.meta.advance(ClassState::Initialized);
        inner.initializing.store(0, Ordering::Release);

        trace!("class {} is initialized", class.name());
        drop(registry);
        Ok(())
    }
}
