//! Pre-pad computation.
//!
//! Interleaving only works when every descendant has at least as much
//! space before its address point as every ancestor: the descendant's
//! sub-vtable must contain the ancestor's at matching relative offsets.
//! One preorder sweep suffices because a parent's pre-pad is final before
//! any of its children are visited.

use crate::Result;
use std::collections::HashMap;
use tracing::debug;
use vtweave_core::{ClassHierarchy, VtableId};

/// Computes the leading padding of every defined vtable in the cloud at
/// `root`, accumulating into `pre_pad` (missing entries mean zero).
pub fn compute_pre_pad(
    cha: &ClassHierarchy,
    root: &str,
    pre_pad: &mut HashMap<VtableId, u64>,
) -> Result<()> {
    let pre = cha.preorder(&VtableId::primary(root));
    let order: HashMap<&VtableId, usize> =
        pre.iter().enumerate().map(|(i, v)| (v, i)).collect();

    for parent in &pre {
        if !cha.is_defined(parent) {
            continue;
        }
        for child in cha.children(parent) {
            if !cha.is_defined(&child) {
                continue;
            }
            // Earlier in the preorder: already handled from another node.
            if order.get(&child).copied().unwrap_or(usize::MAX) < order[parent] {
                continue;
            }

            let parent_range = cha.range(parent)?;
            let child_range = cha.range(&child)?;
            let parent_pre_ap = cha.addr_pt(parent)? - parent_range.first
                + pre_pad.get(parent).copied().unwrap_or(0);
            let child_pre_ap = cha.addr_pt(&child)? - child_range.first
                + pre_pad.get(&child).copied().unwrap_or(0);

            if parent_pre_ap > child_pre_ap {
                let pad = parent_pre_ap - child_pre_ap;
                debug!(
                    "pre-padding {} by {} cells to contain {}",
                    child, pad, parent
                );
                let entry = pre_pad.entry(child.clone()).or_insert(0);
                *entry = (*entry).max(pad);
            }
        }
    }
    Ok(())
}
