//! Ordered layout.
//!
//! The weaker alternative to interleaving: every sub-vtable stays intact
//! and is placed so its address point lands on a multiple of the cloud's
//! power-of-two stride. Downstream checks reduce to a modular test
//! instead of a range test.

use crate::{LayoutSlot, Result};
use tracing::debug;
use vtweave_core::{ClassHierarchy, VtableId, WORD_WIDTH};

/// Builds the ordered slot list for the cloud rooted at `root` and
/// returns it with the byte alignment the emitted global must get.
pub fn order_cloud(cha: &ClassHierarchy, root: &str) -> Result<(Vec<LayoutSlot>, u64)> {
    let pre = cha.preorder(&VtableId::primary(root));

    let mut max = 1u64;
    for v in &pre {
        max = max.max(cha.range(v)?.size());
    }
    let stride = max.next_power_of_two();
    let alignment = stride * WORD_WIDTH as u64;

    let mut slots: Vec<LayoutSlot> = Vec::new();
    for v in &pre {
        if !cha.is_defined(v) {
            continue;
        }
        let r = cha.range(v)?;
        let addr_pt_rel = cha.addr_pt(v)? - r.first;

        // Pad until the address point falls on the stride.
        let occupied = slots.len() as u64 + addr_pt_rel;
        let pad = if occupied % stride == 0 {
            0
        } else {
            stride - occupied % stride
        };
        for _ in 0..pad {
            slots.push(LayoutSlot::Pad);
        }

        for i in 0..r.size() {
            slots.push(LayoutSlot::cell(v.clone(), (r.first + i) as i64));
        }
    }

    debug!(
        "ordered cloud '{}': {} slots, stride {}, alignment {}",
        root,
        slots.len(),
        stride,
        alignment
    );
    Ok((slots, alignment))
}
