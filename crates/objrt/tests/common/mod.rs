// Common test utilities for integration tests
//
// Method implementations here write a distinct usize into the return
// slot so tests can tell which implementation a dispatch resolved to.

#![allow(dead_code)]

use objrt::runtime::{Imp, ObjectPtr, Runtime, Sel};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Creates a selector with no type encoding
pub fn sel(runtime: &Runtime, name: &str) -> Sel {
    runtime
        .register_selector(name, None)
        .expect("Failed to intern test selector")
}

/// Invokes `imp` with no arguments and returns the usize it wrote
pub fn call(imp: Imp, sel: Sel) -> usize {
    let mut out = 0usize;
    // SAFETY: every test implementation takes no arguments and writes at
    // most one usize to `ret`.
    unsafe {
        imp(
            ObjectPtr::null(),
            sel,
            std::ptr::null(),
            (&raw mut out).cast(),
        );
    }
    out
}

/// Resolves `name` on `class` through `msg_lookup` and calls it
pub fn send(runtime: &Runtime, class: &objrt::Class, name: &str) -> usize {
    let sel = sel(runtime, name);
    call(runtime.msg_lookup(class, sel), sel)
}

macro_rules! returning {
    ($($name:ident => $value:expr),* $(,)?) => {
        $(
            /// Writes a fixed value to the return slot
            ///
            /// # Safety
            ///
            /// `ret` must point to writable storage for a usize.
            pub unsafe extern "C" fn $name(
                _receiver: ObjectPtr,
                _cmd: Sel,
                _args: *const *mut u8,
                ret: *mut u8,
            ) {
                if !ret.is_null() {
                    unsafe { ret.cast::<usize>().write_unaligned($value) };
                }
            }
        )*
    };
}

returning! {
    return_1 => 1,
    return_2 => 2,
    return_3 => 3,
    return_10 => 10,
    return_20 => 20,
    return_100 => 100,
    return_200 => 200,
}

/// Records the order `load`/`initialize` hooks fire in.
///
/// Each hook appends its tag to a process-wide log; tests use unique
/// tags so they can run in parallel.
pub static HOOK_LOG: std::sync::Mutex<Vec<&'static str>> = std::sync::Mutex::new(Vec::new());

pub fn hook_log_with_prefix(prefix: &str) -> Vec<&'static str> {
    HOOK_LOG
        .lock()
        .unwrap()
        .iter()
        .copied()
        .filter(|tag| tag.starts_with(prefix))
        .collect()
}

macro_rules! hooks {
    ($($name:ident => $tag:literal),* $(,)?) => {
        $(
            /// Appends its tag to the hook log
            pub unsafe extern "C" fn $name(
                _receiver: ObjectPtr,
                _cmd: Sel,
                _args: *const *mut u8,
                _ret: *mut u8,
            ) {
                HOOK_LOG.lock().unwrap().push($tag);
            }
        )*
    };
}

hooks! {
    order_base_load => "order:Base.load",
    order_derived_load => "order:Derived.load",
    order_category_load => "order:Derived(Extra).load",
    late_load => "late:Attached.load",
    init_base => "init:Base.initialize",
    init_derived => "init:Derived.initialize",
}

/// Counter bumped by [`count_calls`]
pub static CALLS: AtomicUsize = AtomicUsize::new(0);

/// Counts invocations
pub unsafe extern "C" fn count_calls(
    _receiver: ObjectPtr,
    _cmd: Sel,
    _args: *const *mut u8,
    _ret: *mut u8,
) {
    CALLS.fetch_add(1, Ordering::SeqCst);
}
