//! Value model, fragments, module files, and descriptor identity for Mosaic.
//!
//! This crate defines the schema layer: typed configuration values with
//! per-tag merge rules (`Value`, `merge`), immutable contributions
//! (`Fragment`), TOML module parsing (`parse_module_file`), the composed
//! `EnvironmentDescriptor` with its deterministic identity, lock file
//! generation/verification (`DescriptorLock`), and built-in modules.

pub mod builtin;
pub mod descriptor;
pub mod fragment;
pub mod lock;
pub mod module;
pub mod types;
pub mod value;

pub use builtin::{get_builtin, list_builtins, BuiltinModule, BUILTIN_MODULES};
pub use descriptor::{DescriptorIdentity, EnvironmentDescriptor};
pub use fragment::{
    Body, DeriveFn, Fragment, FragmentBuilder, FragmentError, FragmentId, Lookup, Origin,
    Priority, PriorityBounds, Thunk,
};
pub use lock::{DescriptorLock, EntryDrift, LockError};
pub use module::{
    parse_module_file, parse_module_str, FragmentDecl, Module, ModuleError, ModuleFile,
};
pub use types::{DescriptorDigest, ShortDigest, ValueDigest};
pub use value::{merge, merge_all, EnablePolicy, Ranked, Scalar, Tag, Value, ValueError};
