//! Linear clouds: differing address points interleave around the shared
//! address-point column, and mismatched leading space forces prepad.

use crate::common::{linear_hierarchy, prepad_hierarchy};
use vtweave_core::{VtableElem, VtableId};
use vtweave_layout::index::translate_index;
use vtweave_layout::verify::verify_new_layouts;
use vtweave_layout::{LayoutMode, LayoutPlan, LayoutSlot};

fn cell(name: &str, old_pos: i64) -> LayoutSlot {
    LayoutSlot::cell(VtableId::primary(name), old_pos)
}

#[test]
fn differing_address_points_interleave_without_prepad() {
    let cha = linear_hierarchy();
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(&cha, "A").unwrap();

    // A's address point is its first cell, B's is its third; B's two
    // leading cells fill the negative side alone.
    assert_eq!(plan.pre_pad(&VtableId::primary("B")), 0);
    assert_eq!(
        plan.interleaving("A").unwrap(),
        vec![
            cell("B", 0),
            cell("B", 1),
            cell("A", 0),
            cell("B", 2),
            cell("A", 1),
            cell("B", 3),
        ]
    );
    assert_eq!(plan.new_inds(&VtableId::primary("A")).unwrap(), &[2, 4]);
    assert_eq!(
        plan.new_inds(&VtableId::primary("B")).unwrap(),
        &[0, 1, 3, 5]
    );
    verify_new_layouts(&cha, &plan).unwrap();

    // Index agreement: shifted by the address-point delta of 2, both
    // vtables place A's cells at the same relative offsets.
    let a_inds = plan.new_inds(&VtableId::primary("A")).unwrap();
    let b_inds = plan.new_inds(&VtableId::primary("B")).unwrap();
    for i in 0..a_inds.len() {
        let a_rel = a_inds[i] as i64 - a_inds[0] as i64;
        let b_rel = b_inds[i + 2] as i64 - b_inds[2] as i64;
        assert_eq!(a_rel, b_rel, "relative offset of A's cell {i}");
    }
    assert_eq!(
        translate_index(&cha, &plan, &VtableId::primary("B"), 0).unwrap(),
        0
    );
}

#[test]
fn smaller_leading_space_forces_prepad() {
    let cha = prepad_hierarchy();
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(&cha, "A").unwrap();

    // B has no cell before its address point while A keeps one, so B
    // grows a synthetic leading cell at old position -1.
    assert_eq!(plan.pre_pad(&VtableId::primary("B")), 1);
    assert_eq!(
        plan.interleaving("A").unwrap(),
        vec![
            cell("A", 0),
            cell("B", -1),
            cell("A", 1),
            cell("B", 0),
            cell("B", 1),
            cell("B", 2),
        ]
    );
    verify_new_layouts(&cha, &plan).unwrap();
}

#[test]
fn prepad_cells_emit_as_null_slots() {
    use vtweave_core::{GlobalArray, Module};
    use vtweave_relocate::Relocator;

    let cha = prepad_hierarchy();
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(&cha, "A").unwrap();

    let mut module = Module::new();
    for name in ["A", "B"] {
        module
            .add_global(GlobalArray::external(
                name,
                cha.old_vtable(name).unwrap().to_vec(),
            ))
            .unwrap();
    }

    let mut relocator = Relocator::new();
    relocator
        .create_new_vtable(&mut module, &cha, &plan, "A")
        .unwrap();

    let new_global = module.global("_SDA").unwrap();
    assert_eq!(new_global.elems[1], VtableElem::Null);
    assert_eq!(new_global.elems[0], VtableElem::Function("A_f0".into()));
    assert_eq!(new_global.elems[3], VtableElem::Function("B_f0".into()));
}
