//! Relocation scenarios: constructor geps land on planned positions, the
//! rewrite agrees with the planner, and the full pipeline leaves no old
//! vtable or original thunk behind.

use crate::common::{init_tracing, relocate_hierarchy, relocate_module, thunk_hierarchy, thunk_module};
use vtweave_core::{Inst, VtableId, WORD_WIDTH};
use vtweave_layout::index::new_index_of;
use vtweave_layout::ranges::addr_const;
use vtweave_layout::LayoutMode;
use vtweave_relocate::rebuild_layouts;

#[test]
fn constructor_uses_move_into_the_new_global() {
    init_tracing();
    let cha = relocate_hierarchy();
    let mut module = relocate_module(&cha);

    let outcome = rebuild_layouts(&mut module, &cha, LayoutMode::Interleave).unwrap();
    assert_eq!(outcome.uses_redirected, 2);

    // Layout: B0 D0 B1 D1 B2 D2; Derived's address point (old cell 2)
    // lands at position 5.
    let derived = VtableId::primary("Derived");
    let ctor = module.function("Derived_ctor").unwrap();
    assert_eq!(
        ctor.insts,
        vec![Inst::VtableGep {
            global: "_SDBase".into(),
            index: 5,
        }]
    );
    assert!(module.global("Derived").is_none());
    assert!(module.global("Base").is_none());

    // Round trip: the rewritten offset is exactly what the planner maps
    // the old address point to, and in bytes it matches the registered
    // start-address constant.
    let k = new_index_of(&outcome.plan, &derived, 2).unwrap();
    assert_eq!(k, 5);
    let start = addr_const(&cha, &outcome.plan, &derived).unwrap();
    assert_eq!(start.byte_offset, k * WORD_WIDTH as u64);
    assert_eq!(
        outcome.relocator.vtable_range_start(&derived),
        Some(&start)
    );
}

#[test]
fn the_full_pipeline_retires_old_layouts_and_thunks() {
    let cha = thunk_hierarchy();
    let mut module = thunk_module(&cha);

    let outcome = rebuild_layouts(&mut module, &cha, LayoutMode::Interleave).unwrap();
    assert_eq!(outcome.thunks_created, 2);
    assert_eq!(outcome.globals_removed, 4);
    assert_eq!(outcome.thunks_removed, 1);

    assert!(!module.contains_function("_ZTv0_n16_f"));
    assert!(module.contains_function("_SVTLeft_ZTv0_n16_f"));
    assert!(module.contains_function("_SVTDerived_ZTv0_n16_f"));
    for name in ["Base", "Left", "Right", "Derived"] {
        assert!(module.global(name).is_none(), "old vtable of {name}");
    }

    // The emitted cloud substitutes the rewritten clones at the thunk
    // cells.
    let new_global = module.global("_SDBase").unwrap();
    let clones = new_global
        .elems
        .iter()
        .filter(|e| {
            matches!(e, vtweave_core::VtableElem::FunctionBitcast(n) if n.starts_with("_SVT"))
        })
        .count();
    assert_eq!(clones, 2);
}

#[test]
fn mem_ranges_cover_only_defined_descendants() {
    let cha = relocate_hierarchy();
    let mut module = relocate_module(&cha);

    let outcome = rebuild_layouts(&mut module, &cha, LayoutMode::Interleave).unwrap();

    let base = VtableId::primary("Base");
    let derived = VtableId::primary("Derived");
    assert!(outcome.has_mem_range(&base));
    let base_ranges = outcome.mem_range(&base).unwrap();
    assert_eq!(base_ranges.len(), 1);
    assert_eq!(base_ranges[0].defined_count, 2);

    let derived_ranges = outcome.mem_range(&derived).unwrap();
    assert_eq!(derived_ranges.len(), 1);
    assert_eq!(derived_ranges[0].defined_count, 1);
    assert_eq!(
        &derived_ranges[0].start,
        outcome.relocator.vtable_range_start(&derived).unwrap()
    );
}
