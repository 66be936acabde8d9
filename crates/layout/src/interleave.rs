//! Cloud interleaver.
//!
//! Grows the layout outward from the address points in round-robin
//! sweeps: every pass appends the next cell of every live vtable, so
//! cells at equal offsets from their address points stay adjacent across
//! the whole cloud. That adjacency is what turns per-type vptr sets into
//! contiguous ranges.

use crate::{LayoutSlot, Result};
use std::collections::HashMap;
use tracing::debug;
use vtweave_core::{ClassHierarchy, VtableId};

/// Builds the interleaved slot list for the cloud rooted at `root`.
/// `pre_pad` must already cover the cloud (see [`crate::prepad`]).
pub fn interleave_cloud(
    cha: &ClassHierarchy,
    root: &str,
    pre_pad: &HashMap<VtableId, u64>,
) -> Result<Vec<LayoutSlot>> {
    let pre = cha.preorder(&VtableId::primary(root));

    // Negative side first; positive passes are appended after it.
    let mut slots = fill_vtable_part(cha, &pre, pre_pad, false)?;
    slots.extend(fill_vtable_part(cha, &pre, pre_pad, true)?);

    debug!("interleaved cloud '{}': {} slots", root, slots.len());
    Ok(slots)
}

/// One side of the interleaving. Positive passes run from the address
/// point up to the end of each sub-vtable; negative passes run from just
/// below the address point down to the prepadded start.
fn fill_vtable_part(
    cha: &ClassHierarchy,
    pre: &[VtableId],
    pre_pad: &HashMap<VtableId, u64>,
    positive: bool,
) -> Result<Vec<LayoutSlot>> {
    let mut pos: HashMap<&VtableId, i64> = HashMap::new();
    let mut stop: HashMap<&VtableId, i64> = HashMap::new();

    for v in pre {
        let r = cha.range(v)?;
        let addr_pt = cha.addr_pt(v)? as i64;
        pos.insert(v, if positive { addr_pt } else { addr_pt - 1 });
        stop.insert(
            v,
            if positive {
                r.last as i64
            } else {
                r.first as i64 - pre_pad.get(v).copied().unwrap_or(0) as i64
            },
        );
    }

    let step = if positive { 1 } else { -1 };
    let mut part: Vec<LayoutSlot> = Vec::new();
    let mut pass: Vec<LayoutSlot> = Vec::new();
    loop {
        for v in pre {
            if !cha.is_defined(v) {
                continue;
            }
            let p = pos[v];
            let in_bounds = if positive { p <= stop[v] } else { p >= stop[v] };
            if in_bounds {
                pass.push(LayoutSlot::cell(v.clone(), p));
                if let Some(slot) = pos.get_mut(v) {
                    *slot += step;
                }
            }
        }
        if pass.is_empty() {
            break;
        }
        if positive {
            part.append(&mut pass);
        } else {
            // Later passes carry cells farther below the address point;
            // they go in front so old positions stay ascending.
            pass.append(&mut part);
            std::mem::swap(&mut part, &mut pass);
        }
    }
    Ok(part)
}
