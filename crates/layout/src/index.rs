//! Index mapping between old vtable cells and planned positions.

use crate::{Error, LayoutPlan, LayoutSlot, Result};
use std::collections::HashMap;
use tracing::warn;
use vtweave_core::{ClassHierarchy, VtableId};

/// Walks a planned slot list and records, per vtable, the new position of
/// each of its cells. Pad slots consume a position without being
/// recorded.
///
/// Cells of one vtable occur in the slot list in ascending old-position
/// order, so entry `j` of a vtable's table is its old cell
/// `first - pre_pad + j`.
pub fn calculate_new_layout_inds(
    slots: &[LayoutSlot],
    new_inds: &mut HashMap<VtableId, Vec<u64>>,
) {
    let mut current = 0u64;
    for slot in slots {
        if let LayoutSlot::Cell { v, .. } = slot {
            new_inds.entry(v.clone()).or_default().push(current);
        }
        current += 1;
    }
}

/// The planned position of the cell at `index` cells past the
/// sub-vtable's first old cell.
pub fn new_index_of(plan: &LayoutPlan, v: &VtableId, index: u64) -> Result<u64> {
    let inds = plan.new_inds(v)?;
    inds.get(index as usize)
        .copied()
        .ok_or(Error::TranslateOutOfBounds {
            v: v.clone(),
            index: index as i64,
            size: inds.len() as u64,
        })
}

/// Translates an address-point-relative old index into the distance
/// between the planned positions of that cell and of the address point.
///
/// Undefined vtables delegate to their first defined descendant, whose
/// layout contains theirs. A vtable the plan knows nothing about passes
/// the offset through unchanged.
pub fn translate_index(
    cha: &ClassHierarchy,
    plan: &LayoutPlan,
    v: &VtableId,
    offset: i64,
) -> Result<i64> {
    let mut v = v.clone();
    if !cha.is_defined(&v) {
        if let Some(d) = cha.first_defined_descendant(&v) {
            v = d;
        }
    }

    if !plan.is_planned(&v) {
        warn!(
            "vtable {} has no planned layout; leaving index {} untouched",
            v, offset
        );
        return Ok(offset);
    }
    let inds = plan.new_inds(&v)?;

    let r = cha.range(&v)?;
    let old_addr_pt = (cha.addr_pt(&v)? - r.first) as i64;
    let full_index = old_addr_pt + offset;
    if full_index < 0 || full_index > (r.last - r.first) as i64 {
        return Err(Error::TranslateOutOfBounds {
            v,
            index: full_index,
            size: r.size(),
        });
    }

    Ok(inds[full_index as usize] as i64 - inds[old_addr_pt as usize] as i64)
}
