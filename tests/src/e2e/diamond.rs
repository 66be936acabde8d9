//! Diamond cloud: four same-shaped vtables interleave cell-for-cell and
//! the whole pipeline relocates every constructor.

use crate::common::{diamond_hierarchy, diamond_module, init_tracing};
use vtweave_core::{Inst, VtableId};
use vtweave_layout::ranges::calculate_vptr_ranges;
use vtweave_layout::{LayoutMode, LayoutPlan, LayoutSlot};
use vtweave_relocate::rebuild_layouts;

fn cell(name: &str, old_pos: i64) -> LayoutSlot {
    LayoutSlot::cell(VtableId::primary(name), old_pos)
}

#[test]
fn the_diamond_interleaves_cell_for_cell() {
    let cha = diamond_hierarchy();
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(&cha, "A").unwrap();

    assert_eq!(
        plan.interleaving("A").unwrap(),
        vec![
            cell("A", 0),
            cell("B", 0),
            cell("C", 0),
            cell("D", 0),
            cell("A", 1),
            cell("B", 1),
            cell("C", 1),
            cell("D", 1),
            cell("A", 2),
            cell("B", 2),
            cell("C", 2),
            cell("D", 2),
        ]
    );

    assert_eq!(plan.new_inds(&VtableId::primary("A")).unwrap(), &[0, 4, 8]);
    assert_eq!(plan.new_inds(&VtableId::primary("B")).unwrap(), &[1, 5, 9]);
    assert_eq!(plan.new_inds(&VtableId::primary("C")).unwrap(), &[2, 6, 10]);
    assert_eq!(plan.new_inds(&VtableId::primary("D")).unwrap(), &[3, 7, 11]);
    assert_eq!(plan.new_vtbl_address_point("A").unwrap(), 0);
    assert_eq!(plan.alignment("A").unwrap(), 8);
}

#[test]
fn subtree_ranges_follow_the_preorder() {
    let cha = diamond_hierarchy();
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(&cha, "A").unwrap();

    let (range_map, mem) = calculate_vptr_ranges(&cha, &plan, "A").unwrap();
    assert_eq!(range_map[&VtableId::primary("A")], vec![(0, 4)]);
    assert_eq!(range_map[&VtableId::primary("B")], vec![(1, 2)]);
    assert_eq!(range_map[&VtableId::primary("C")], vec![(2, 4)]);
    assert_eq!(range_map[&VtableId::primary("D")], vec![(3, 4)]);

    // A's single interval covers all four defined vtables and anchors on
    // A's own new address point (position 4, byte 32).
    let a_mem = &mem[&VtableId::primary("A")];
    assert_eq!(a_mem.len(), 1);
    assert_eq!(a_mem[0].defined_count, 4);
    assert_eq!(a_mem[0].start.global, "_SDA");
    assert_eq!(a_mem[0].start.byte_offset, 32);
}

#[test]
fn the_pipeline_relocates_every_constructor() {
    init_tracing();
    let cha = diamond_hierarchy();
    let mut module = diamond_module(&cha);

    let outcome = rebuild_layouts(&mut module, &cha, LayoutMode::Interleave).unwrap();
    assert_eq!(outcome.uses_redirected, 4);
    assert_eq!(outcome.globals_removed, 4);
    assert_eq!(outcome.thunks_created, 0);

    // Each constructor now takes its class's new address point in _SDA.
    for (name, new_index) in [("A", 4), ("B", 5), ("C", 6), ("D", 7)] {
        let ctor = module.function(&format!("{name}_ctor")).unwrap();
        assert_eq!(
            ctor.insts[1],
            Inst::VtableGep {
                global: "_SDA".into(),
                index: new_index,
            },
            "constructor of {name}"
        );
        assert!(module.global(name).is_none(), "old vtable of {name}");
    }

    let new_global = module.global("_SDA").unwrap();
    assert_eq!(new_global.elems.len(), 12);
    assert_eq!(new_global.align, 8);
}

#[test]
fn analysis_results_can_be_cleared_after_a_run() {
    let mut cha = diamond_hierarchy();
    let mut module = diamond_module(&cha);

    let mut outcome = rebuild_layouts(&mut module, &cha, LayoutMode::Interleave).unwrap();
    assert!(outcome.has_mem_range(&VtableId::primary("A")));

    outcome.clear_analysis_results(&mut cha);
    assert!(!outcome.has_mem_range(&VtableId::primary("A")));
    assert_eq!(cha.roots().count(), 0);
    assert!(outcome.plan.interleaving("A").is_err());
}
