//! Planned-layout verification.
//!
//! Runs after planning and before any IR mutation: a plan that fails
//! here aborts the whole transformation. Every failure logs the
//! offending cloud one slot per line so planner regressions stay
//! debuggable.

use crate::{Error, LayoutMode, LayoutPlan, LayoutSlot, Result, VptrRange};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};
use vtweave_core::{ClassHierarchy, VtableId};

/// Renders a planned cloud one line per slot: `pos : name,sub [old_pos]`.
pub fn dump_layout(slots: &[LayoutSlot]) -> String {
    let mut out = String::from("New vtable layout:\n");
    for (i, slot) in slots.iter().enumerate() {
        match slot {
            LayoutSlot::Pad => out.push_str(&format!("{i} : <pad>\n")),
            LayoutSlot::Cell { v, old_pos } => {
                out.push_str(&format!("{i} : {},{} [{}]\n", v.name, v.sub, old_pos));
            }
        }
    }
    out
}

/// Checks density and collision-freedom for every planned cloud, plus
/// containment and index agreement when the layout is interleaved.
/// Ordered layouts only promise address-point alignment, so the
/// cross-vtable checks do not apply to them.
pub fn verify_new_layouts(cha: &ClassHierarchy, plan: &LayoutPlan) -> Result<()> {
    let roots: Vec<String> = plan.planned_roots().map(str::to_string).collect();
    for root in &roots {
        debug!("verifying cloud '{}'", root);
        verify_cloud(cha, plan, root)?;
    }
    Ok(())
}

fn verify_cloud(cha: &ClassHierarchy, plan: &LayoutPlan, root: &str) -> Result<()> {
    let slots = plan.interleaving(root)?;

    // Old-position -> new-position map per vtable, collision-checked.
    let mut ind_map: HashMap<VtableId, BTreeMap<i64, u64>> = HashMap::new();
    for (i, slot) in slots.iter().enumerate() {
        let LayoutSlot::Cell { v, old_pos } = slot else {
            continue;
        };
        let entry = ind_map.entry(v.clone()).or_default();
        if let Some(&first) = entry.get(old_pos) {
            return fail(
                slots,
                Error::EntryAppearsTwice {
                    root: root.to_string(),
                    v: v.clone(),
                    old_pos: *old_pos,
                    first,
                    second: i as u64,
                },
            );
        }
        entry.insert(*old_pos, i as u64);
    }

    let cloud = cha.preorder(&VtableId::primary(root));
    let order: HashMap<&VtableId, usize> =
        cloud.iter().enumerate().map(|(i, v)| (v, i)).collect();

    // Density: every defined vtable covers its prepadded old range, once.
    for n in &cloud {
        if cha.is_undefined_class(&n.name) {
            continue;
        }
        let Some(inds) = ind_map.get(n) else {
            return fail(
                slots,
                Error::MissingFromLayout {
                    root: root.to_string(),
                    v: n.clone(),
                },
            );
        };
        let r = cha.range(n)?;
        let expected = r.last as i64 - (r.first as i64 - plan.pre_pad(n) as i64) + 1;
        let (min, max) = match (inds.keys().next(), inds.keys().next_back()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => {
                return fail(
                    slots,
                    Error::MissingFromLayout {
                        root: root.to_string(),
                        v: n.clone(),
                    },
                )
            }
        };
        if max - min + 1 != expected {
            return fail(
                slots,
                Error::SparseIndexMap {
                    root: root.to_string(),
                    v: n.clone(),
                    span: (max - min + 1) as u64,
                    expected: expected as u64,
                },
            );
        }
        if inds.len() as i64 != expected {
            return fail(
                slots,
                Error::IndexMapSize {
                    root: root.to_string(),
                    v: n.clone(),
                    len: inds.len(),
                    expected: expected as u64,
                },
            );
        }
    }

    // Ordered layouts stop here.
    if plan.mode() == LayoutMode::Order {
        return Ok(());
    }

    // Containment: each parent's prepadded sub-vtable fits inside each
    // child's, on both sides of the address point.
    for parent in &cloud {
        if cha.is_undefined_class(&parent.name) {
            continue;
        }
        for child in cha.children(parent) {
            if cha.is_undefined_class(&child.name) {
                continue;
            }
            if order.get(&child).copied().unwrap_or(usize::MAX) < order[parent] {
                continue;
            }

            let pr = cha.range(parent)?;
            let cr = cha.range(&child)?;
            let p_ap = cha.addr_pt(parent)?;
            let c_ap = cha.addr_pt(&child)?;
            let p_before = p_ap - pr.first + plan.pre_pad(parent);
            let c_before = c_ap - cr.first + plan.pre_pad(&child);
            if p_before > c_before || pr.last - p_ap > cr.last - c_ap {
                return fail(
                    slots,
                    Error::ParentNotContained {
                        parent: parent.clone(),
                        child: child.clone(),
                    },
                );
            }
        }
    }

    // Index agreement: shifting by the address-point delta, parent and
    // child place every shared cell at the same relative position.
    for parent in &cloud {
        if cha.is_undefined_class(&parent.name) {
            continue;
        }
        for child in cha.children(parent) {
            if cha.is_undefined_class(&child.name) {
                continue;
            }
            if order.get(&child).copied().unwrap_or(usize::MAX) < order[parent] {
                continue;
            }

            let pr = cha.range(parent)?;
            let p_ap = cha.addr_pt(parent)? as i64;
            let c_ap = cha.addr_pt(&child)? as i64;
            let delta = c_ap - p_ap;

            let new_p_ap = lookup(&ind_map, root, parent, p_ap, slots)?;
            let new_c_ap = lookup(&ind_map, root, &child, c_ap, slots)?;

            let total = pr.last as i64 - pr.first as i64 + plan.pre_pad(parent) as i64 + 1;
            for i in 0..total {
                let old = pr.first as i64 + i - plan.pre_pad(parent) as i64;
                let p_rel = lookup(&ind_map, root, parent, old, slots)? as i64 - new_p_ap as i64;
                let c_rel =
                    lookup(&ind_map, root, &child, old + delta, slots)? as i64 - new_c_ap as i64;
                if p_rel != c_rel {
                    return fail(
                        slots,
                        Error::IndexDisagreement {
                            parent: parent.clone(),
                            child: child.clone(),
                            index: old - p_ap,
                            parent_new: p_rel,
                            child_new: c_rel,
                        },
                    );
                }
            }
        }
    }

    Ok(())
}

fn lookup(
    ind_map: &HashMap<VtableId, BTreeMap<i64, u64>>,
    root: &str,
    v: &VtableId,
    old_pos: i64,
    slots: &[LayoutSlot],
) -> Result<u64> {
    match ind_map.get(v).and_then(|m| m.get(&old_pos)) {
        Some(&pos) => Ok(pos),
        None => fail(
            slots,
            Error::MissingCell {
                root: root.to_string(),
                v: v.clone(),
                old_pos,
            },
        ),
    }
}

fn fail<T>(slots: &[LayoutSlot], err: Error) -> Result<T> {
    error!("{err}\n{}", dump_layout(slots));
    Err(err)
}

/// Checks the synthesized vptr ranges of one cloud: pairwise disjoint,
/// total length equal to the subtree size, every descendant covered.
pub fn verify_vptr_ranges(
    cha: &ClassHierarchy,
    root: &str,
    range_map: &HashMap<VtableId, Vec<VptrRange>>,
) -> Result<()> {
    let pre = cha.preorder(&VtableId::primary(root));
    let ind: HashMap<&VtableId, u64> = pre
        .iter()
        .enumerate()
        .map(|(i, v)| (v, i as u64))
        .collect();

    for v in &pre {
        let descendants = cha.preorder(v);
        let ranges = range_map.get(v).map(Vec::as_slice).unwrap_or(&[]);

        let mut covered = 0u64;
        let mut last_end: Option<u64> = None;
        for &(start, end) in ranges {
            covered += end - start;
            if let Some(last) = last_end {
                if start <= last {
                    return Err(Error::RangesOverlap {
                        v: v.clone(),
                        position: start,
                    });
                }
            }
            last_end = Some(end);
        }

        if covered != descendants.len() as u64 {
            return Err(Error::RangeCount {
                v: v.clone(),
                covered,
                expected: descendants.len() as u64,
            });
        }

        for d in &descendants {
            let Some(&di) = ind.get(d) else {
                return Err(Error::DescendantNotCovered {
                    v: v.clone(),
                    descendant: d.clone(),
                });
            };
            if !ranges.iter().any(|&(s, e)| s <= di && di < e) {
                return Err(Error::DescendantNotCovered {
                    v: v.clone(),
                    descendant: d.clone(),
                });
            }
        }
    }
    Ok(())
}
