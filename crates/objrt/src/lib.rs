//! `objrt`: dispatch core for a message-passing object runtime
//!
//! `objrt` provides the pieces a compiled object-oriented language needs
//! to resolve a message send to a function at run time:
//!
//! - **Selector Interning** from names and type encodings to dense 24-bit ids
//! - **Sparse Dispatch Tables** with three indexed loads per lookup
//! - **Class Registry** that accepts classes and categories in any order
//! - **Recursive Locking** with owner tracking, also used for per-object
//!   synchronized sections
//!
//! # Architecture
//!
//! - **Registry Layer**: class and category records, lifecycle states and
//!   `load`/`initialize` hooks, all under one recursive lock
//! - **Dispatch Layer**: per-class tables published through `ArcSwap`,
//!   read without locking
//! - **Diagnostics**: leveled logging through `objrt-log`; unrecoverable
//!   errors go through [`error::fatal`]
//!
//! # Example
//!
//! ```rust
//! use objrt::runtime::{ClassDescriptor, Runtime};
//!
//! let runtime = Runtime::new();
//! let object = runtime.register_class(ClassDescriptor::root("Object")).unwrap();
//! let string = runtime
//!     .register_class(ClassDescriptor::new("String", "Object").with_instance_size(24))
//!     .unwrap();
//!
//! assert!(string.is_subclass_of(&object));
//! assert_eq!(runtime.classes().len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use runtime::{
    Category, CategoryDescriptor, Class, ClassDescriptor, ClassState, Imp, ModuleDescriptor,
    ObjectPtr, Runtime, Sel, global,
};
