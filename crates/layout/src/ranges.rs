//! Vptr range synthesis.
//!
//! For every vtable, the preorder positions of its subtree are coalesced
//! into disjoint half-open intervals; call-site instrumentation later
//! checks a runtime vptr against these instead of a set membership test.
//! Intervals are materialized as address constants into the emitted
//! cloud global, skipping undefined leading entries and dropping
//! intervals with no defined member at all.

use crate::{index, LayoutPlan, Result, VptrRange};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use vtweave_core::{new_vtable_name, ClassHierarchy, VtableId, WORD_WIDTH};

/// Abstract address constant: a named global plus a byte offset into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrConst {
    pub global: String,
    pub byte_offset: u64,
}

/// One materialized interval: where compatible vptrs start, and how many
/// defined vtables the interval covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRange {
    pub start: AddrConst,
    pub defined_count: u64,
}

/// Address constant of `v`'s address point inside its cloud's new global.
pub fn addr_const(cha: &ClassHierarchy, plan: &LayoutPlan, v: &VtableId) -> Result<AddrConst> {
    let root = cha.ancestor(v)?;
    let r = cha.range(v)?;
    let addr_pt_rel = cha.addr_pt(v)? - r.first;
    let new_pos = index::new_index_of(plan, v, addr_pt_rel)?;
    Ok(AddrConst {
        global: new_vtable_name(root),
        byte_offset: new_pos * WORD_WIDTH as u64,
    })
}

/// Synthesizes the per-vtable interval sets of one cloud: the preorder
/// interval map and its memory-range materialization.
pub fn calculate_vptr_ranges(
    cha: &ClassHierarchy,
    plan: &LayoutPlan,
    root: &str,
) -> Result<(
    HashMap<VtableId, Vec<VptrRange>>,
    HashMap<VtableId, Vec<MemRange>>,
)> {
    let root_id = VtableId::primary(root);
    let pre = cha.preorder(&root_id);
    let ind: HashMap<&VtableId, u64> = pre
        .iter()
        .enumerate()
        .map(|(i, v)| (v, i as u64))
        .collect();

    let mut range_map: HashMap<VtableId, Vec<VptrRange>> = HashMap::new();
    ranges_of(cha, &root_id, &ind, &mut range_map);

    let mut mem_range_map: HashMap<VtableId, Vec<MemRange>> = HashMap::new();
    for v in &pre {
        let Some(ranges) = range_map.get(v) else {
            continue;
        };
        for &(start, end) in ranges {
            let defined_count = pre[start as usize..end as usize]
                .iter()
                .filter(|d| cha.is_defined(d))
                .count() as u64;
            if defined_count == 0 {
                continue;
            }
            // Anchor the interval on its first defined member.
            let mut s = start;
            while s < end && !cha.is_defined(&pre[s as usize]) {
                s += 1;
            }
            mem_range_map
                .entry(v.clone())
                .or_default()
                .push(MemRange {
                    start: addr_const(cha, plan, &pre[s as usize])?,
                    defined_count,
                });
        }
    }

    debug!(
        "synthesized vptr ranges for cloud '{}': {} vtables",
        root,
        range_map.len()
    );
    Ok((range_map, mem_range_map))
}

/// Post-order accumulation: a node's raw intervals are its own preorder
/// position plus every child's intervals, sorted and coalesced.
fn ranges_of(
    cha: &ClassHierarchy,
    v: &VtableId,
    ind: &HashMap<&VtableId, u64>,
    range_map: &mut HashMap<VtableId, Vec<VptrRange>>,
) {
    if range_map.contains_key(v) {
        return;
    }
    for child in cha.children(v) {
        ranges_of(cha, &child, ind, range_map);
    }

    let mut ranges: Vec<VptrRange> = Vec::new();
    if let Some(&i) = ind.get(v) {
        ranges.push((i, i + 1));
    }
    for child in cha.children(v) {
        if let Some(child_ranges) = range_map.get(&child) {
            ranges.extend(child_ranges.iter().copied());
        }
    }
    ranges.sort_unstable();

    let mut coalesced: Vec<VptrRange> = Vec::new();
    let mut current: Option<VptrRange> = None;
    for (start, end) in ranges {
        match current {
            None => current = Some((start, end)),
            Some((cur_start, cur_end)) => {
                if start <= cur_end {
                    if end > cur_end {
                        current = Some((cur_start, end));
                    }
                } else {
                    coalesced.push((cur_start, cur_end));
                    current = Some((start, end));
                }
            }
        }
    }
    if let Some(last) = current {
        coalesced.push(last);
    }

    range_map.insert(v.clone(), coalesced);
}
