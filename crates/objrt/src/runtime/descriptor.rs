//! Loader-facing descriptions of classes, categories and modules.
//!
//! Descriptors carry names and implementations only. Selectors are
//! interned and names resolved when a descriptor is registered with a
//! [`Runtime`](crate::runtime::Runtime).

use crate::runtime::object::Imp;
use std::fmt;

/// A method as declared by a class or category.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    /// Type encoding; part of the selector's identity.
    pub types: Option<String>,
    pub imp: Imp,
}

impl MethodDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, imp: Imp) -> Self {
        MethodDescriptor {
            name: name.into(),
            types: None,
            imp,
        }
    }

    #[must_use]
    pub fn typed(name: impl Into<String>, types: impl Into<String>, imp: Imp) -> Self {
        MethodDescriptor {
            name: name.into(),
            types: Some(types.into()),
            imp,
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

/// Declaration of a class and its metaclass.
///
/// # Example
///
/// ```rust
/// use objrt::runtime::{ClassDescriptor, ObjectPtr, Sel};
///
/// unsafe extern "C" fn describe(_: ObjectPtr, _: Sel, _: *const *mut u8, _: *mut u8) {}
///
/// let desc = ClassDescriptor::new("Point", "Object")
///     .with_instance_size(16)
///     .with_method("describe", describe)
///     .with_class_method("new", describe);
///
/// assert_eq!(desc.superclass.as_deref(), Some("Object"));
/// assert_eq!(desc.instance_methods.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    /// `None` for a root class.
    pub superclass: Option<String>,
    /// Bytes this class adds on top of its superclass.
    pub instance_size: usize,
    pub instance_methods: Vec<MethodDescriptor>,
    pub class_methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    /// A class without a superclass.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        ClassDescriptor {
            name: name.into(),
            superclass: None,
            instance_size: 0,
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn new(name: impl Into<String>, superclass: impl Into<String>) -> Self {
        ClassDescriptor {
            superclass: Some(superclass.into()),
            ..ClassDescriptor::root(name)
        }
    }

    #[must_use]
    pub fn with_instance_size(mut self, size: usize) -> Self {
        self.instance_size = size;
        self
    }

    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, imp: Imp) -> Self {
        self.instance_methods.push(MethodDescriptor::new(name, imp));
        self
    }

    #[must_use]
    pub fn with_class_method(mut self, name: impl Into<String>, imp: Imp) -> Self {
        self.class_methods.push(MethodDescriptor::new(name, imp));
        self
    }

    /// Adds a fully specified instance method, type encoding included.
    #[must_use]
    pub fn with_method_descriptor(mut self, method: MethodDescriptor) -> Self {
        self.instance_methods.push(method);
        self
    }
}

/// Methods added to an existing class, possibly before it is registered.
#[derive(Debug, Clone)]
pub struct CategoryDescriptor {
    pub name: String,
    pub class_name: String,
    pub instance_methods: Vec<MethodDescriptor>,
    pub class_methods: Vec<MethodDescriptor>,
}

impl CategoryDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        CategoryDescriptor {
            name: name.into(),
            class_name: class_name.into(),
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, imp: Imp) -> Self {
        self.instance_methods.push(MethodDescriptor::new(name, imp));
        self
    }

    #[must_use]
    pub fn with_class_method(mut self, name: impl Into<String>, imp: Imp) -> Self {
        self.class_methods.push(MethodDescriptor::new(name, imp));
        self
    }
}

/// Selector referenced by a module without being implemented there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorDescriptor {
    pub name: String,
    pub types: Option<String>,
}

/// One compiled unit: its selector references, classes and categories.
///
/// Loading a module registers everything it declares under a single
/// acquisition of the registry lock.
#[derive(Debug, Clone, Default)]
pub struct ModuleDescriptor {
    pub name: String,
    pub selectors: Vec<SelectorDescriptor>,
    pub classes: Vec<ClassDescriptor>,
    pub categories: Vec<CategoryDescriptor>,
}

impl ModuleDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ModuleDescriptor {
            name: name.into(),
            ..ModuleDescriptor::default()
        }
    }

    #[must_use]
    pub fn with_selector(mut self, name: impl Into<String>, types: Option<&str>) -> Self {
        self.selectors.push(SelectorDescriptor {
            name: name.into(),
            types: types.map(str::to_owned),
        });
        self
    }

    #[must_use]
    pub fn with_class(mut self, class: ClassDescriptor) -> Self {
        self.classes.push(class);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: CategoryDescriptor) -> Self {
        self.categories.push(category);
        self
    }
}
