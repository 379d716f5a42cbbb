//! Class and category registration.
//!
//! Classes and categories may arrive in any order. A class advances
//! through its lifecycle as soon as its dependencies allow:
//!
//! ```text
//!   Registered --(superclass chain resolves)--> Setup
//!   Setup      --(pending categories merged)--> Loaded
//!   Loaded     --(first message send)---------> Initialized
//! ```
//!
//! A category whose class is not yet `Loaded` is parked under the class
//! name and merged when the class loads. A category for a class that is
//! already `Loaded` attaches immediately and the class's tables, and
//! those of its subclasses, are rebuilt.
//!
//! # Locking
//!
//! Every mutation runs under the runtime's recursive registry lock. The
//! state itself sits in a `RefCell` inside that lock; the borrow is
//! always released before `load` hooks run, so a hook may register
//! classes or send messages on the same thread.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::runtime::category::{Category, CategoryInner};
use crate::runtime::class::{Class, ClassInner, ClassState, Method};
use crate::runtime::descriptor::{
    CategoryDescriptor, ClassDescriptor, MethodDescriptor, ModuleDescriptor,
};
use crate::runtime::dtable;
use crate::runtime::object::{Imp, ObjectPtr, call_hook};
use crate::runtime::selector::Sel;
use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use objrt_log::{debug, info, trace, warn};
use std::sync::Arc;

pub(crate) struct ClassRecord {
    pub(crate) class: Arc<ClassInner>,
    instance_methods: Vec<Method>,
    class_methods: Vec<Method>,
    /// Attached categories, in registration order.
    pub(crate) categories: Vec<Arc<CategoryInner>>,
    /// Ids of classes whose superclass is this one; filled at `Setup`.
    pub(crate) subclasses: Vec<usize>,
}

impl ClassRecord {
    pub(crate) fn methods(&self, meta: bool) -> &[Method] {
        if meta {
            &self.class_methods
        } else {
            &self.instance_methods
        }
    }

    fn methods_mut(&mut self, meta: bool) -> &mut Vec<Method> {
        if meta {
            &mut self.class_methods
        } else {
            &mut self.instance_methods
        }
    }
}

#[derive(Default)]
pub(crate) struct RegistryState {
    /// Indexed by class id.
    pub(crate) classes: Vec<ClassRecord>,
    by_name: HashMap<Arc<str>, usize, FxBuildHasher>,
    pending: HashMap<Arc<str>, Vec<Arc<CategoryInner>>, FxBuildHasher>,
}

impl RegistryState {
    fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Id of `class` if it belongs to this registry.
    pub(crate) fn id_of(&self, class: &Class) -> Result<usize> {
        self.classes
            .get(class.id())
            .filter(|record| Arc::ptr_eq(&record.class, &class.inner))
            .map(|_| class.id())
            .ok_or_else(|| Error::ClassNotFound {
                name: class.name().to_owned(),
            })
    }

    /// Class `id` followed by its ancestors up to the root.
    ///
    /// # Errors
    ///
    /// [`Error::UnresolvedSuperclass`] if an ancestor is not registered,
    /// [`Error::InheritanceCycle`] if the chain loops.
    pub(crate) fn chain(&self, id: usize) -> Result<Vec<usize>> {
        let mut chain = vec![id];
        let mut current = id;

        while let Some(name) = &self.classes[current].class.superclass_name {
            let Some(superclass) = self.find(name) else {
                return Err(Error::UnresolvedSuperclass {
                    class: self.classes[id].class.name.to_string(),
                    superclass: name.to_string(),
                });
            };
            if chain.contains(&superclass) {
                return Err(Error::InheritanceCycle {
                    class: name.to_string(),
                });
            }
            chain.push(superclass);
            current = superclass;
        }
        Ok(chain)
    }

    /// Links class `id` to its superclass. The superclass must already be
    /// `Setup`.
    fn setup(&mut self, id: usize) {
        let class = Arc::clone(&self.classes[id].class);
        if class.instance.state() >= ClassState::Setup {
            return;
        }

        let superclass = class.superclass_name.as_deref().and_then(|name| self.find(name));
        match superclass {
            Some(superclass) => {
                class.link_superclass(Some(&self.classes[superclass].class));
                self.classes[superclass].subclasses.push(id);
            }
            None => class.link_superclass(None),
        }

        class.instance.advance(ClassState::Setup);
        class.meta.advance(ClassState::Setup);
        trace!("class {} is set up ({} bytes)", class.name, class.instance_size());
    }
}

/// A `load` implementation waiting to run once the registry borrow ends.
pub(crate) struct LoadHook {
    imp: Imp,
    receiver: ObjectPtr,
    cmd: Sel,
    owner: Arc<str>,
}

pub(crate) fn run_hooks(hooks: Vec<LoadHook>) {
    for hook in hooks {
        trace!("running load of {}", hook.owner);
        call_hook(hook.imp, hook.receiver, hook.cmd);
    }
}

impl Runtime {
    fn intern_methods(&self, methods: &[MethodDescriptor]) -> Result<Vec<Method>> {
        methods
            .iter()
            .map(|method| {
                Ok(Method {
                    selector: self.selectors.intern(&method.name, method.types.as_deref())?,
                    imp: method.imp,
                })
            })
            .collect()
    }

    fn insert_class(&self, state: &mut RegistryState, desc: ClassDescriptor) -> Result<Class> {
        if state.find(&desc.name).is_some() {
            warn!("class {} is already registered, ignoring duplicate", desc.name);
            return Err(Error::ClassAlreadyExists { name: desc.name });
        }

        let instance_methods = self.intern_methods(&desc.instance_methods)?;
        let class_methods = self.intern_methods(&desc.class_methods)?;

        let id = state.classes.len();
        let inner = Arc::new(ClassInner::new(
            id,
            Arc::from(desc.name),
            desc.superclass.map(Arc::from),
            desc.instance_size,
        ));
        state.by_name.insert(Arc::clone(&inner.name), id);
        state.classes.push(ClassRecord {
            class: Arc::clone(&inner),
            instance_methods,
            class_methods,
            categories: Vec::new(),
            subclasses: Vec::new(),
        });

        debug!("registered class {}", inner.name);
        Ok(Class::instance_side(inner))
    }

    fn insert_category(
        &self,
        state: &mut RegistryState,
        desc: CategoryDescriptor,
        hooks: &mut Vec<LoadHook>,
    ) -> Result<Category> {
        let inner = Arc::new(CategoryInner {
            instance_methods: self.intern_methods(&desc.instance_methods)?,
            class_methods: self.intern_methods(&desc.class_methods)?,
            name: Arc::from(desc.name),
            class_name: Arc::from(desc.class_name),
        });

        match state.find(&inner.class_name) {
            Some(id) if state.classes[id].class.instance.state() >= ClassState::Loaded => {
                state.classes[id].categories.push(Arc::clone(&inner));
                debug!(
                    "attached category {}({}) to loaded class",
                    inner.class_name, inner.name
                );
                self.collect_category_load(&state.classes[id].class, &inner, hooks);
                dtable::rebuild(state, id)?;
            }
            _ => {
                state
                    .pending
                    .entry(Arc::clone(&inner.class_name))
                    .or_default()
                    .push(Arc::clone(&inner));
                debug!(
                    "category {}({}) pending until its class loads",
                    inner.class_name, inner.name
                );
            }
        }
        Ok(Category { inner })
    }

    fn collect_category_load(
        &self,
        class: &Arc<ClassInner>,
        category: &CategoryInner,
        hooks: &mut Vec<LoadHook>,
    ) {
        if let Some(method) = category
            .class_methods
            .iter()
            .rev()
            .find(|method| method.selector == self.load_sel)
        {
            hooks.push(LoadHook {
                imp: method.imp,
                receiver: Class::instance_side(Arc::clone(class)).as_object(),
                cmd: self.load_sel,
                owner: Arc::from(format!("{}({})", category.class_name, category.name)),
            });
        }
    }

    /// Moves class `id` from `Setup` to `Loaded`, merging parked categories.
    fn load(&self, state: &mut RegistryState, id: usize, hooks: &mut Vec<LoadHook>) -> Result<()> {
        let class = Arc::clone(&state.classes[id].class);
        if class.instance.state() >= ClassState::Loaded {
            return Ok(());
        }

        let parked = state.pending.remove(&class.name).unwrap_or_default();
        if !parked.is_empty() {
            debug!("merging {} pending categories into {}", parked.len(), class.name);
        }

        if let Some(method) = state.classes[id]
            .class_methods
            .iter()
            .rev()
            .find(|method| method.selector == self.load_sel)
        {
            hooks.push(LoadHook {
                imp: method.imp,
                receiver: Class::instance_side(Arc::clone(&class)).as_object(),
                cmd: self.load_sel,
                owner: Arc::clone(&class.name),
            });
        }
        for category in &parked {
            self.collect_category_load(&class, category, hooks);
        }
        state.classes[id].categories.extend(parked);

        class.instance.advance(ClassState::Loaded);
        class.meta.advance(ClassState::Loaded);
        trace!("class {} is loaded", class.name);

        if self.config.eager_dispatch_tables {
            dtable::ensure(state, id, false)?;
            dtable::ensure(state, id, true)?;
        }
        Ok(())
    }

    /// Sets up and loads class `id` and all of its ancestors, root first.
    pub(crate) fn advance(
        &self,
        state: &mut RegistryState,
        id: usize,
        hooks: &mut Vec<LoadHook>,
    ) -> Result<()> {
        let chain = state.chain(id)?;
        for &ancestor in chain.iter().rev() {
            state.setup(ancestor);
            self.load(state, ancestor, hooks)?;
        }
        Ok(())
    }

    /// Advances every class whose superclass chain now resolves.
    fn settle(&self, state: &mut RegistryState, hooks: &mut Vec<LoadHook>) -> Result<()> {
        for id in 0..state.classes.len() {
            if state.classes[id].class.instance.state() >= ClassState::Loaded {
                continue;
            }
            match self.advance(state, id, hooks) {
                Ok(()) => {}
                // stays Registered until its ancestors show up
                Err(Error::UnresolvedSuperclass { .. } | Error::InheritanceCycle { .. }) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    /// Registers a class and advances every class that can now make progress.
    ///
    /// Returns the instance side of the new class. It is `Loaded` if its
    /// superclass chain is complete and `Registered` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassAlreadyExists`] if the name is taken (the
    /// registry is left unchanged) and [`Error::OutOfSelectorSlots`] if a
    /// method selector cannot be interned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use objrt::runtime::{ClassDescriptor, ClassState, Runtime};
    ///
    /// let runtime = Runtime::new();
    /// // subclass first: it waits for its superclass
    /// let derived = runtime
    ///     .register_class(ClassDescriptor::new("Derived", "Base"))
    ///     .unwrap();
    /// assert_eq!(derived.state(), ClassState::Registered);
    ///
    /// runtime.register_class(ClassDescriptor::root("Base")).unwrap();
    /// assert_eq!(derived.state(), ClassState::Loaded);
    /// ```
    pub fn register_class(&self, desc: ClassDescriptor) -> Result<Class> {
        let registry = self.registry.lock();
        let mut hooks = Vec::new();
        let class = {
            let mut state = registry.borrow_mut();
            let class = self.insert_class(&mut state, desc)?;
            self.settle(&mut state, &mut hooks)?;
            class
        };
        run_hooks(hooks);
        Ok(class)
    }

    /// Registers a category, attaching it now if its class is `Loaded` and
    /// parking it otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfSelectorSlots`] if a method selector cannot be
    /// interned.
    pub fn register_category(&self, desc: CategoryDescriptor) -> Result<Category> {
        let registry = self.registry.lock();
        let mut hooks = Vec::new();
        let category = {
            let mut state = registry.borrow_mut();
            self.insert_category(&mut state, desc, &mut hooks)?
        };
        run_hooks(hooks);
        Ok(category)
    }

    /// Interns a standalone selector reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfSelectorSlots`] once the id space is exhausted.
    pub fn register_selector(&self, name: &str, types: Option<&str>) -> Result<Sel> {
        self.selectors.intern(name, types)
    }

    /// Registers everything a module declares under one registry lock:
    /// selectors, then classes, then categories, then advances classes.
    ///
    /// Duplicate class names are logged and skipped. Returns the classes
    /// that were newly registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfSelectorSlots`] if the id space runs out part
    /// way through. Whatever was registered before that stays registered.
    pub fn load_module(&self, module: ModuleDescriptor) -> Result<Vec<Class>> {
        let registry = self.registry.lock();
        let mut hooks = Vec::new();
        let classes = {
            let mut state = registry.borrow_mut();

            for selector in &module.selectors {
                self.selectors.intern(&selector.name, selector.types.as_deref())?;
            }

            let mut classes = Vec::with_capacity(module.classes.len());
            for desc in module.classes {
                match self.insert_class(&mut state, desc) {
                    Ok(class) => classes.push(class),
                    Err(Error::ClassAlreadyExists { .. }) => {}
                    Err(error) => return Err(error),
                }
            }

            for desc in module.categories {
                self.insert_category(&mut state, desc, &mut hooks)?;
            }

            self.settle(&mut state, &mut hooks)?;
            classes
        };

        info!(
            "loaded module {} ({} classes, {} load hooks)",
            module.name,
            classes.len(),
            hooks.len()
        );
        run_hooks(hooks);
        Ok(classes)
    }

    /// Replaces, or adds, the implementation of `sel` in the method list of
    /// `class` (instance or metaclass side) and rebuilds affected tables.
    ///
    /// Returns the implementation the class itself declared before.
    /// Categories attached to the class still take precedence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if `class` came from another runtime.
    pub fn replace_method(&self, class: &Class, sel: Sel, imp: Imp) -> Result<Option<Imp>> {
        let registry = self.registry.lock();
        let mut state = registry.borrow_mut();
        let id = state.id_of(class)?;

        let methods = state.classes[id].methods_mut(class.is_metaclass());
        let previous = match methods.iter_mut().rev().find(|method| method.selector == sel) {
            Some(method) => Some(std::mem::replace(&mut method.imp, imp)),
            None => {
                methods.push(Method { selector: sel, imp });
                None
            }
        };

        dtable::rebuild(&state, id)?;
        debug!(
            "replaced {} in {}",
            self.selectors.name(sel),
            class.name()
        );
        Ok(previous)
    }

    /// Looks up a registered class by name, in whatever state it is in.
    #[must_use]
    pub fn lookup_class(&self, name: &str) -> Option<Class> {
        let registry = self.registry.lock();
        let state = registry.borrow();
        state
            .find(name)
            .map(|id| Class::instance_side(Arc::clone(&state.classes[id].class)))
    }

    /// Like [`lookup_class`](Self::lookup_class), but a missing class is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if no class has that name.
    pub fn get_class(&self, name: &str) -> Result<Class> {
        self.lookup_class(name).ok_or_else(|| Error::ClassNotFound {
            name: name.to_owned(),
        })
    }

    /// All registered classes in registration order.
    #[must_use]
    pub fn classes(&self) -> Vec<Class> {
        let registry = self.registry.lock();
        let state = registry.borrow();
        state
            .classes
            .iter()
            .map(|record| Class::instance_side(Arc::clone(&record.class)))
            .collect()
    }

    /// Categories attached to `class`, in the order they were applied.
    #[must_use]
    pub fn categories(&self, class: &Class) -> Vec<Category> {
        let registry = self.registry.lock();
        let state = registry.borrow();
        state.id_of(class).map_or_else(
            |_| Vec::new(),
            |id| {
                state.classes[id]
                    .categories
                    .iter()
                    .map(|inner| Category {
                        inner: Arc::clone(inner),
                    })
                    .collect()
            },
        )
    }

    /// Categories parked for a class name that has not loaded yet.
    #[must_use]
    pub fn pending_categories(&self, class_name: &str) -> Vec<Category> {
        let registry = self.registry.lock();
        let state = registry.borrow();
        state.pending.get(class_name).map_or_else(Vec::new, |parked| {
            parked
                .iter()
                .map(|inner| Category {
                    inner: Arc::clone(inner),
                })
                .collect()
        })
    }
}
