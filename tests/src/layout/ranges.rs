//! Range-synthesis properties: interval unions cover exactly each
//! vtable's subtree, disjointly.

use crate::common::{diamond_hierarchy, fn_cells};
use std::collections::BTreeSet;
use vtweave_core::{ClassHierarchy, HierarchyBuilder, SubVtable, VtableId};
use vtweave_layout::ranges::calculate_vptr_ranges;
use vtweave_layout::verify::verify_vptr_ranges;
use vtweave_layout::{LayoutMode, LayoutPlan};

fn synthesized(
    cha: &ClassHierarchy,
    root: &str,
) -> std::collections::HashMap<VtableId, Vec<(u64, u64)>> {
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(cha, root).unwrap();
    let (range_map, _) = calculate_vptr_ranges(cha, &plan, root).unwrap();
    verify_vptr_ranges(cha, root, &range_map).unwrap();
    range_map
}

#[test]
fn range_unions_equal_the_preorder_subtrees() {
    let cha = diamond_hierarchy();
    let range_map = synthesized(&cha, "A");

    let pre = cha.preorder(&VtableId::primary("A"));
    for (i, v) in pre.iter().enumerate() {
        let subtree: BTreeSet<u64> = cha
            .preorder(v)
            .iter()
            .map(|d| pre.iter().position(|p| p == d).unwrap() as u64)
            .collect();
        let covered: BTreeSet<u64> = range_map[v]
            .iter()
            .flat_map(|&(s, e)| s..e)
            .collect();
        assert_eq!(covered, subtree, "range union of {v} (preorder {i})");
    }
}

#[test]
fn sibling_subtrees_stay_disjoint() {
    let cha = diamond_hierarchy();
    let range_map = synthesized(&cha, "A");

    let b: BTreeSet<u64> = range_map[&VtableId::primary("B")]
        .iter()
        .flat_map(|&(s, e)| s..e)
        .collect();
    let c: BTreeSet<u64> = range_map[&VtableId::primary("C")]
        .iter()
        .flat_map(|&(s, e)| s..e)
        .collect();
    assert!(b.is_disjoint(&c));
}

#[test]
fn leaf_subtrees_collapse_to_singleton_intervals() {
    // Three leaves under one root: each leaf's range map is exactly its
    // own preorder position.
    let mut builder = HierarchyBuilder::new();
    for name in ["A", "B", "C", "D"] {
        builder.add_class(name, vec![SubVtable::new(0, 1, 0, name)], fn_cells(name, 2));
    }
    builder.add_root("A");
    builder.add_edge(VtableId::primary("A"), VtableId::primary("B"));
    builder.add_edge(VtableId::primary("A"), VtableId::primary("C"));
    builder.add_edge(VtableId::primary("A"), VtableId::primary("D"));
    let cha = builder.finish().unwrap();

    let range_map = synthesized(&cha, "A");
    assert_eq!(range_map[&VtableId::primary("A")], vec![(0, 4)]);
    assert_eq!(range_map[&VtableId::primary("C")], vec![(2, 3)]);
}
