//! Pipeline driver.
//!
//! Phase order is load-bearing: planning and layout verification finish
//! before the first IR mutation, thunk rewriting finishes before any
//! cloud is emitted (clones are shared across clouds), and deletion runs
//! only after every cloud's uses are redirected. A verification failure
//! therefore leaves the module byte-for-byte untouched.

use crate::emit::Relocator;
use crate::thunks::create_thunk_functions;
use crate::Result;
use std::collections::HashMap;
use tracing::info;
use vtweave_core::{ClassHierarchy, Module, VtableId};
use vtweave_layout::ranges::{calculate_vptr_ranges, MemRange};
use vtweave_layout::verify::{verify_new_layouts, verify_vptr_ranges};
use vtweave_layout::{LayoutMode, LayoutPlan, VptrRange};

/// Everything a completed run leaves behind for downstream consumers.
#[derive(Debug)]
pub struct RebuildOutcome {
    pub plan: LayoutPlan,
    pub relocator: Relocator,
    /// Disjoint preorder intervals per vtable.
    pub range_maps: HashMap<VtableId, Vec<VptrRange>>,
    /// Materialized intervals per vtable, defined members only.
    pub mem_ranges: HashMap<VtableId, Vec<MemRange>>,
    pub thunks_created: usize,
    pub uses_redirected: usize,
    pub globals_removed: usize,
    pub thunks_removed: usize,
}

impl RebuildOutcome {
    pub fn has_mem_range(&self, v: &VtableId) -> bool {
        self.mem_ranges.contains_key(v)
    }

    pub fn mem_range(&self, v: &VtableId) -> Option<&[MemRange]> {
        self.mem_ranges.get(v).map(Vec::as_slice)
    }

    /// Drops all analysis state, the hierarchy's included.
    pub fn clear_analysis_results(&mut self, cha: &mut ClassHierarchy) {
        cha.clear_analysis_results();
        self.plan.clear();
        self.range_maps.clear();
        self.mem_ranges.clear();
    }
}

/// Rebuilds every cloud of the module onto a fresh layout: plan, verify,
/// rewrite thunks, emit and redirect, retire the old layout, synthesize
/// and verify vptr ranges.
pub fn rebuild_layouts(
    module: &mut Module,
    cha: &ClassHierarchy,
    mode: LayoutMode,
) -> Result<RebuildOutcome> {
    let roots: Vec<String> = cha.roots().map(str::to_string).collect();
    info!(
        "rebuilding vtable layouts for {} cloud roots ({:?})",
        roots.len(),
        mode
    );

    let mut plan = LayoutPlan::new(mode);
    for root in &roots {
        plan.plan_cloud(cha, root)?;
    }

    // Everything so far is pure analysis; a bad plan aborts here with
    // the module untouched.
    verify_new_layouts(cha, &plan)?;

    let mut thunks_created = 0;
    for root in &roots {
        thunks_created += create_thunk_functions(module, cha, &plan, root)?;
    }

    let mut relocator = Relocator::new();
    let mut uses_redirected = 0;
    for root in &roots {
        uses_redirected += relocator.create_new_vtable(module, cha, &plan, root)?;
    }

    let (globals_removed, thunks_removed) = relocator.remove_old_layouts(module, cha)?;

    let mut range_maps = HashMap::new();
    let mut mem_ranges = HashMap::new();
    for root in &roots {
        let (ranges, mem) = calculate_vptr_ranges(cha, &plan, root)?;
        verify_vptr_ranges(cha, root, &ranges)?;
        range_maps.extend(ranges);
        mem_ranges.extend(mem);
    }

    info!(
        "rebuilt {} clouds: {} thunks rewritten, {} uses redirected, \
         {} globals and {} thunks removed",
        roots.len(),
        thunks_created,
        uses_redirected,
        globals_removed,
        thunks_removed
    );

    Ok(RebuildOutcome {
        plan,
        relocator,
        range_maps,
        mem_ranges,
        thunks_created,
        uses_redirected,
        globals_removed,
        thunks_removed,
    })
}
