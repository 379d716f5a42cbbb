//! Categories: method sets merged into a class after the fact.

use crate::runtime::class::Method;
use std::fmt;
use std::sync::Arc;

pub(crate) struct CategoryInner {
    pub(crate) name: Arc<str>,
    pub(crate) class_name: Arc<str>,
    pub(crate) instance_methods: Vec<Method>,
    pub(crate) class_methods: Vec<Method>,
}

impl CategoryInner {
    pub(crate) fn methods(&self, meta: bool) -> &[Method] {
        if meta {
            &self.class_methods
        } else {
            &self.instance_methods
        }
    }
}

/// Handle to a registered category, attached or still pending.
#[derive(Clone)]
pub struct Category {
    pub(crate) inner: Arc<CategoryInner>,
}

impl Category {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Name of the class this category extends.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    #[must_use]
    pub fn instance_methods(&self) -> &[Method] {
        &self.inner.instance_methods
    }

    #[must_use]
    pub fn class_methods(&self) -> &[Method] {
        &self.inner.class_methods
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Category {}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Category({}({}))", self.class_name(), self.name())
    }
}
