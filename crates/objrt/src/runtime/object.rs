//! Receiver handles and method implementation pointers.
//!
//! Objects themselves live outside this crate. The runtime only needs an
//! opaque, address-comparable handle for the receiver of a message and
//! for keying synchronized sections.

use crate::runtime::selector::Sel;
use std::ffi::c_void;
use std::fmt;

/// Method implementation.
///
/// Follows the message-send calling convention: receiver, selector,
/// pointer to an array of argument pointers, pointer to return storage.
///
/// # Safety
///
/// Implementations must validate `args` and `ret` against the method's
/// type encoding before dereferencing them; the runtime never looks at
/// either.
pub type Imp = unsafe extern "C" fn(
    receiver: ObjectPtr,
    cmd: Sel,
    args: *const *mut u8,
    ret: *mut u8,
);

/// Opaque receiver handle. Equality is identity.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPtr(*mut c_void);

impl ObjectPtr {
    #[must_use]
    pub const fn null() -> Self {
        ObjectPtr(std::ptr::null_mut())
    }

    #[must_use]
    pub const fn from_raw(ptr: *mut c_void) -> Self {
        ObjectPtr(ptr)
    }

    /// Handle for any Rust value's address; handy for class objects and tests.
    #[must_use]
    pub fn from_ref<T: ?Sized>(value: &T) -> Self {
        ObjectPtr(std::ptr::from_ref(value).cast::<c_void>().cast_mut())
    }

    #[must_use]
    pub const fn as_raw(self) -> *mut c_void {
        self.0
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Address used as the identity key.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

// SAFETY: the handle is never dereferenced by the runtime; it is only
// compared and handed back to method implementations.
unsafe impl Send for ObjectPtr {}
// SAFETY: see above.
unsafe impl Sync for ObjectPtr {}

impl fmt::Debug for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPtr({:p})", self.0)
    }
}

/// Calls a zero-argument implementation, discarding any return value.
///
/// Used for the runtime's own `load` and `initialize` sends.
pub(crate) fn call_hook(imp: Imp, receiver: ObjectPtr, cmd: Sel) {
    let mut ret = [0u8; 16];
    // SAFETY: hooks take no arguments; the return buffer is large enough
    // for any scalar return and is discarded.
    unsafe { imp(receiver, cmd, std::ptr::null(), ret.as_mut_ptr()) }
}
