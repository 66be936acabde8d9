//! Layout planning for interleaved and ordered vtable clouds.
//!
//! Each cloud root is planned into a single slot list whose positions are
//! the new linear layout; the index mapper then derives per-vtable
//! old-to-new tables, the range synthesizer coalesces descendant sets
//! into intervals, and the verifier rejects any plan that violates the
//! layout invariants before a single IR mutation happens.

pub mod index;
pub mod interleave;
pub mod order;
pub mod prepad;
pub mod ranges;
pub mod report;
pub mod verify;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;
use vtweave_core::{ClassHierarchy, VtableId, WORD_WIDTH};

/// Layout strategy for a cloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutMode {
    /// Cells of all cloud members interleaved around their address
    /// points; downstream checks a vptr against a range.
    #[default]
    Interleave,
    /// Whole sub-vtables at power-of-two-aligned offsets; downstream
    /// checks a vptr with a modular test.
    Order,
}

/// One slot of a planned cloud layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutSlot {
    /// Padding; consumes a position, owned by no vtable.
    Pad,
    /// The cell `old_pos` of `v`'s old array. Prepad cells carry
    /// positions below the sub-vtable's first index.
    Cell { v: VtableId, old_pos: i64 },
}

impl LayoutSlot {
    pub fn cell(v: VtableId, old_pos: i64) -> Self {
        LayoutSlot::Cell { v, old_pos }
    }
}

/// Half-open interval over preorder positions of a cloud.
pub type VptrRange = (u64, u64);

/// Layout planning error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("in cloud '{root}' entry {v}[{old_pos}] appears twice - at {first} and {second}")]
    EntryAppearsTwice {
        root: String,
        v: VtableId,
        old_pos: i64,
        first: u64,
        second: u64,
    },

    #[error("in cloud '{root}' vtable {v} is missing from the layout")]
    MissingFromLayout { root: String, v: VtableId },

    #[error("in cloud '{root}' vtable {v} has no cell at old position {old_pos}")]
    MissingCell {
        root: String,
        v: VtableId,
        old_pos: i64,
    },

    #[error("in cloud '{root}' index map for {v} spans {span} positions, expected {expected}")]
    SparseIndexMap {
        root: String,
        v: VtableId,
        span: u64,
        expected: u64,
    },

    #[error("in cloud '{root}' index map for {v} has {len} entries, expected {expected}")]
    IndexMapSize {
        root: String,
        v: VtableId,
        len: usize,
        expected: u64,
    },

    #[error("parent vtable {parent} is not contained in child vtable {child}")]
    ParentNotContained { parent: VtableId, child: VtableId },

    #[error(
        "parent {parent} relative index {index} maps to {parent_new}, \
         child {child} maps to {child_new}"
    )]
    IndexDisagreement {
        parent: VtableId,
        child: VtableId,
        index: i64,
        parent_new: i64,
        child_new: i64,
    },

    #[error("translate: index {index} is outside vtable {v} (size {size})")]
    TranslateOutOfBounds { v: VtableId, index: i64, size: u64 },

    #[error("cloud '{0}' has not been planned")]
    UnplannedCloud(String),

    #[error("vtable {0} does not appear in the planned layout")]
    UnplannedVtable(VtableId),

    #[error("vptr ranges of {v} are not disjoint at position {position}")]
    RangesOverlap { v: VtableId, position: u64 },

    #[error("vptr ranges of {v} cover {covered} positions, expected {expected} descendants")]
    RangeCount {
        v: VtableId,
        covered: u64,
        expected: u64,
    },

    #[error("descendant {descendant} of {v} is outside every vptr range")]
    DescendantNotCovered { v: VtableId, descendant: VtableId },

    #[error(transparent)]
    Core(#[from] vtweave_core::Error),
}

/// Layout result type
pub type Result<T> = std::result::Result<T, Error>;

/// Per-run planning state, keyed by cloud root and vtable id.
///
/// Created empty, populated by [`LayoutPlan::plan_cloud`], consumed
/// read-only by verification and relocation, dropped or [`LayoutPlan::clear`]ed
/// when the run is over.
#[derive(Debug)]
pub struct LayoutPlan {
    mode: LayoutMode,
    pre_pad: HashMap<VtableId, u64>,
    interleavings: BTreeMap<String, Vec<LayoutSlot>>,
    new_inds: HashMap<VtableId, Vec<u64>>,
    alignments: BTreeMap<String, u64>,
}

impl LayoutPlan {
    pub fn new(mode: LayoutMode) -> Self {
        Self {
            mode,
            pre_pad: HashMap::new(),
            interleavings: BTreeMap::new(),
            new_inds: HashMap::new(),
            alignments: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    /// Leading synthetic cells planned before `v`'s first old cell.
    pub fn pre_pad(&self, v: &VtableId) -> u64 {
        self.pre_pad.get(v).copied().unwrap_or(0)
    }

    /// The planned slot list of a cloud.
    pub fn interleaving(&self, root: &str) -> Result<&[LayoutSlot]> {
        self.interleavings
            .get(root)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnplannedCloud(root.to_string()))
    }

    /// Byte alignment the emitted cloud global must get.
    pub fn alignment(&self, root: &str) -> Result<u64> {
        self.alignments
            .get(root)
            .copied()
            .ok_or_else(|| Error::UnplannedCloud(root.to_string()))
    }

    /// Dense old-cell-to-new-position table for `v`. Entry `j` is the new
    /// position of old cell `first - pre_pad + j`.
    pub fn new_inds(&self, v: &VtableId) -> Result<&[u64]> {
        self.new_inds
            .get(v)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnplannedVtable(v.clone()))
    }

    pub fn is_planned(&self, v: &VtableId) -> bool {
        self.new_inds.contains_key(v)
    }

    /// Roots planned so far, sorted.
    pub fn planned_roots(&self) -> impl Iterator<Item = &str> {
        self.interleavings.keys().map(String::as_str)
    }

    /// Plans one cloud: interleave or order it, then index-map the slots.
    pub fn plan_cloud(&mut self, cha: &ClassHierarchy, root: &str) -> Result<()> {
        debug_assert!(cha.is_root(root), "'{root}' is not a cloud root");
        let (slots, alignment) = match self.mode {
            LayoutMode::Interleave => {
                prepad::compute_pre_pad(cha, root, &mut self.pre_pad)?;
                let slots = interleave::interleave_cloud(cha, root, &self.pre_pad)?;
                (slots, WORD_WIDTH as u64)
            }
            LayoutMode::Order => order::order_cloud(cha, root)?,
        };
        index::calculate_new_layout_inds(&slots, &mut self.new_inds);
        self.interleavings.insert(root.to_string(), slots);
        self.alignments.insert(root.to_string(), alignment);
        debug!("planned cloud '{}' ({:?})", root, self.mode);
        Ok(())
    }

    /// Installs a pre-built slot list for a cloud, index-mapping it the
    /// usual way. Used to replay a recorded layout.
    pub fn install_cloud(&mut self, root: &str, slots: Vec<LayoutSlot>, alignment: u64) {
        index::calculate_new_layout_inds(&slots, &mut self.new_inds);
        self.interleavings.insert(root.to_string(), slots);
        self.alignments.insert(root.to_string(), alignment);
    }

    /// New position of the primary sub-vtable's first cell; downstream
    /// passes anchor on it.
    pub fn new_vtbl_address_point(&self, name: &str) -> Result<u64> {
        let v = VtableId::primary(name);
        let inds = self.new_inds(&v)?;
        inds.first()
            .copied()
            .ok_or(Error::UnplannedVtable(v))
    }

    /// Drops all planning state; the plan can be reused for another run.
    pub fn clear(&mut self) {
        self.pre_pad.clear();
        self.interleavings.clear();
        self.new_inds.clear();
        self.alignments.clear();
        debug!("cleared layout planning state");
    }
}
