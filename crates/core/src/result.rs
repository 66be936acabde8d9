//! Core results and error types

use crate::hierarchy::VtableId;
use thiserror::Error;

/// Core error type encompassing hierarchy and module failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The sub-vtable's address point lies outside its declared range.
    #[error("sub-vtable {id} has address point {addr_pt} outside range [{first}, {last}]")]
    AddressPointOutsideRange {
        /// The offending sub-vtable.
        id: VtableId,
        /// The declared address point.
        addr_pt: u64,
        /// Start of the declared range.
        first: u64,
        /// End of the declared range.
        last: u64,
    },

    /// A cell index that no declared sub-vtable of the class covers.
    #[error("old index {index} is outside every sub-vtable of '{name}'")]
    CellOutsideSubVtables {
        /// The owning class.
        name: String,
        /// The stray cell index.
        index: u64,
    },

    /// A function with that name already exists in the module.
    #[error("function '{0}' already exists in the module")]
    DuplicateFunction(String),

    /// A global with that name already exists in the module.
    #[error("global '{0}' already exists in the module")]
    DuplicateGlobal(String),

    /// The global still has uses and cannot be removed.
    #[error("global '{name}' still has {uses} uses and cannot be removed")]
    GlobalInUse {
        /// The global that was about to be removed.
        name: String,
        /// How many instruction-level uses remain.
        uses: usize,
    },

    /// The class has no address point at the given old cell index.
    #[error("class '{name}' has no address point at old index {index}")]
    NoSuchAddressPoint {
        /// The owning class.
        name: String,
        /// The index that is not an address point.
        index: u64,
    },

    /// The class declares fewer sub-vtables than the requested order.
    #[error("class '{name}' has no sub-vtable {sub}")]
    NoSuchSubVtable {
        /// The owning class.
        name: String,
        /// The requested sub-vtable order.
        sub: u64,
    },

    /// A defined class whose old vtable array is shorter than its ranges.
    #[error("defined class '{name}' needs an old vtable covering index {required}, got {len} cells")]
    OldVtableTooShort {
        /// The owning class.
        name: String,
        /// Highest cell index any sub-vtable range reaches.
        required: u64,
        /// Actual length of the supplied array.
        len: usize,
    },

    /// An edge would give the vtable a second parent.
    #[error("vtable {0} already has a parent; the hierarchy must stay a forest")]
    SecondParent(VtableId),

    /// A class name the hierarchy has never been told about.
    #[error("unknown class '{0}'")]
    UnknownClass(String),

    /// A function name the module has never been told about.
    #[error("function '{0}' does not exist in the module")]
    UnknownFunction(String),

    /// A global name the module has never been told about.
    #[error("global '{0}' does not exist in the module")]
    UnknownGlobal(String),

    /// A vtable id the hierarchy has never been told about.
    #[error("unknown vtable {0}")]
    UnknownVtable(VtableId),
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
