//! Dispatch table construction.
//!
//! A table is built privately and published whole:
//!
//! 1. start from a copy of the superclass's table (building it first if
//!    needed), or from an empty table at the root
//! 2. apply the class's own methods in declaration order
//! 3. apply each attached category's methods in registration order
//!
//! Later writes win, so categories override the class and each other.
//! The root metaclass starts from the root class's instance table.
//!
//! All functions here run under the registry lock.

use crate::error::Result;
use crate::runtime::class::DispatchTable;
use crate::runtime::registry::RegistryState;
use crate::runtime::sparse::SparseArray;
use objrt_log::{debug, trace};
use std::sync::Arc;

fn parent(state: &RegistryState, id: usize, meta: bool) -> Option<(usize, bool)> {
    match state.classes[id].class.resolved_superclass() {
        Some(superclass) => Some((superclass.id, meta)),
        None if meta => Some((id, false)),
        None => None,
    }
}

/// Builds a fresh table for one side of class `id`.
///
/// The class must be at least `Setup`; before that its superclass link is
/// missing and the table would be built as if it were a root.
pub(crate) fn build(state: &RegistryState, id: usize, meta: bool) -> Result<DispatchTable> {
    let mut table = match parent(state, id, meta) {
        Some((parent, parent_meta)) => SparseArray::copy_from(&*ensure(state, parent, parent_meta)?),
        None => SparseArray::new(),
    };

    let record = &state.classes[id];
    for method in record.methods(meta) {
        table.set(method.selector.id(), method.imp)?;
    }
    for category in &record.categories {
        for method in category.methods(meta) {
            table.set(method.selector.id(), method.imp)?;
        }
    }
    Ok(table)
}

/// Returns the published table for one side of class `id`, building and
/// publishing it on first use.
pub(crate) fn ensure(state: &RegistryState, id: usize, meta: bool) -> Result<Arc<DispatchTable>> {
    let side = state.classes[id].class.side(meta);
    if let Some(table) = side.snapshot() {
        return Ok(table);
    }

    let table = side.publish(build(state, id, meta)?);
    trace!(
        "built {} dispatch table of {} ({} entries)",
        if meta { "class" } else { "instance" },
        state.classes[id].class.name,
        table.len()
    );
    Ok(table)
}

/// Rebuilds and swaps in every already-built table of class `id` and of
/// its descendants. Sides that were never built stay unbuilt.
pub(crate) fn rebuild(state: &RegistryState, id: usize) -> Result<()> {
    // instance side first: the root metaclass copies it
    for meta in [false, true] {
        let side = state.classes[id].class.side(meta);
        if side.has_table() {
            side.publish(build(state, id, meta)?);
        }
    }
    debug!("rebuilt dispatch tables of {}", state.classes[id].class.name);

    for &subclass in &state.classes[id].subclasses {
        rebuild(state, subclass)?;
    }
    Ok(())
}
