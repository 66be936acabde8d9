//! Relocation passes for planned vtable layouts.
//!
//! Three pieces, run strictly in order by [`pipeline::rebuild_layouts`]:
//! thunk rewriting (clones each virtual thunk once per layout class),
//! emission (materializes the `_SD` globals and redirects every old use),
//! and removal (retires old vtable globals and original thunks).

pub mod emit;
pub mod pipeline;
pub mod thunks;

use thiserror::Error;
use vtweave_core::VtableId;

/// Relocation error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A vtable cell references a thunk whose rewritten clone is absent.
    #[error("rewritten thunk '{0}' is missing from the module")]
    MissingThunkClone(String),

    /// An old vtable is used other than through a constant gep.
    #[error("use of old vtable '{global}' in '{function}' is not a constant getelementptr")]
    NonGepUse { global: String, function: String },

    /// A constructor takes an address the hierarchy knows no address
    /// point for.
    #[error("'{name}' is used with address point {index}, which the hierarchy does not know")]
    UnknownAddressPoint { name: String, index: i64 },

    /// The same vtable was registered with a start address twice.
    #[error("new start address for {0} registered twice")]
    DuplicateStartAddr(VtableId),

    #[error(transparent)]
    Core(#[from] vtweave_core::Error),

    #[error(transparent)]
    Layout(#[from] vtweave_layout::Error),
}

/// Relocation result type
pub type Result<T> = std::result::Result<T, Error>;

pub use emit::Relocator;
pub use pipeline::{rebuild_layouts, RebuildOutcome};
pub use thunks::create_thunk_functions;
