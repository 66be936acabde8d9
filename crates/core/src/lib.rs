//! Core data model for the vtweave layout builder.
//!
//! This crate carries everything the planning and relocation passes share:
//! the class-hierarchy oracle, the abstract module IR, and the naming
//! contract exposed to downstream instrumentation.

pub mod hierarchy;
pub mod module;
pub mod result;

pub use hierarchy::{ClassHierarchy, HierarchyBuilder, Range, SubVtable, VtableId};
pub use module::{Function, GlobalArray, Inst, Linkage, Module, UseRef, VtableElem};
pub use result::{Error, Result};

/// Number of bytes in a pointer-sized vtable cell (64-bit targets).
/// Byte-unit literals in thunk bodies divide by this; emitted offsets
/// multiply by it.
pub const WORD_WIDTH: i64 = 8;

/// Prefix of every emitted interleaved vtable global.
///
/// Part of the ABI with the call-site instrumentation pass; never change.
pub const NEW_VTABLE_PREFIX: &str = "_SD";

/// Prefix of every rewritten virtual-thunk clone.
///
/// Part of the ABI with the call-site instrumentation pass; never change.
pub const NEW_VTHUNK_PREFIX: &str = "_SVT";

/// Returns true if the function name denotes a virtual thunk.
///
/// Virtual thunks (`_ZTv`) and virtual covariant thunks (`_ZTcv`) embed a
/// vcall index that is only valid for one layout class.
pub fn is_vthunk(name: &str) -> bool {
    name.starts_with("_ZTv") || name.starts_with("_ZTcv")
}

/// Name of the interleaved vtable global emitted for a cloud root.
pub fn new_vtable_name(root: &str) -> String {
    format!("{NEW_VTABLE_PREFIX}{root}")
}

/// Name of a thunk clone rewritten for one layout class.
pub fn new_vthunk_name(layout_class: &str, thunk: &str) -> String {
    format!("{NEW_VTHUNK_PREFIX}{layout_class}{thunk}")
}
