//! Thunk scenarios: literal rewriting against the planned layout, and
//! one clone per layout class.

use crate::common::{thunk_hierarchy, thunk_module};
use vtweave_core::{Inst, VtableId};
use vtweave_layout::index::translate_index;
use vtweave_layout::{LayoutMode, LayoutPlan};
use vtweave_relocate::create_thunk_functions;

fn planned() -> (vtweave_core::ClassHierarchy, LayoutPlan) {
    let cha = thunk_hierarchy();
    let mut plan = LayoutPlan::new(LayoutMode::Interleave);
    plan.plan_cloud(&cha, "Base").unwrap();
    (cha, plan)
}

#[test]
fn vcall_literals_are_rewritten_to_planned_byte_offsets() {
    let (cha, plan) = planned();
    let mut module = thunk_module(&cha);

    // Byte literal 16 is old index 2; Derived's cells sit at 3, 7 and 10,
    // so the planned distance from the address point is 7 cells.
    assert_eq!(
        translate_index(&cha, &plan, &VtableId::primary("Derived"), 2).unwrap(),
        7
    );

    create_thunk_functions(&mut module, &cha, &plan, "Base").unwrap();

    let clone = module.function("_SVTDerived_ZTv0_n16_f").unwrap();
    assert_eq!(
        clone.insts,
        vec![Inst::Opaque, Inst::ConstInt(56), Inst::Opaque]
    );
    assert!(!clone
        .insts
        .iter()
        .any(|inst| matches!(inst, Inst::VCallIndex { .. })));

    // The original keeps its intrinsic call until the deletion sweep.
    let original = module.function("_ZTv0_n16_f").unwrap();
    assert!(original
        .insts
        .iter()
        .any(|inst| matches!(inst, Inst::VCallIndex { .. })));
}

#[test]
fn one_clone_per_layout_class() {
    let (cha, plan) = planned();
    let mut module = thunk_module(&cha);

    let created = create_thunk_functions(&mut module, &cha, &plan, "Base").unwrap();
    assert_eq!(created, 2);
    assert!(module.contains_function("_SVTLeft_ZTv0_n16_f"));
    assert!(module.contains_function("_SVTDerived_ZTv0_n16_f"));

    // Rewriting again reuses both clones.
    let created_again = create_thunk_functions(&mut module, &cha, &plan, "Base").unwrap();
    assert_eq!(created_again, 0);

    // The two layout classes see different layouts only through their
    // own translation; here both embed the same byte offset but remain
    // distinct functions.
    let left = module.function("_SVTLeft_ZTv0_n16_f").unwrap();
    let derived = module.function("_SVTDerived_ZTv0_n16_f").unwrap();
    assert_eq!(left.insts[1], Inst::ConstInt(56));
    assert_eq!(derived.insts[1], Inst::ConstInt(56));
}
