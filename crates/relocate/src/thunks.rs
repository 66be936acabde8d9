//! Virtual-thunk rewriting.
//!
//! A virtual thunk embeds a byte-unit vcall index that is only valid for
//! one layout class. Every thunk referenced from a cloud's old vtables is
//! cloned once per layout class under the `_SVT` prefix and its embedded
//! literal rewritten to the planned index. Existing clones are reused, so
//! rewriting is idempotent across clouds.

use crate::Result;
use tracing::debug;
use vtweave_core::{new_vthunk_name, ClassHierarchy, Inst, Module, VtableId, WORD_WIDTH};
use vtweave_layout::index::translate_index;
use vtweave_layout::LayoutPlan;

/// Clones and rewrites every thunk referenced from the cloud at `root`.
/// Returns how many clones were created.
pub fn create_thunk_functions(
    module: &mut Module,
    cha: &ClassHierarchy,
    plan: &LayoutPlan,
    root: &str,
) -> Result<usize> {
    let rewrite_literals = module.has_vcall_index_intrinsic();
    let mut created = 0;

    for v in cha.preorder(&VtableId::primary(root)) {
        if !cha.has_old_vtable(&v.name) {
            // Undefined classes carry no array to scan.
            continue;
        }

        for cell in 0..cha.old_vtable(&v.name)?.len() {
            let Some(thunk) = cha.old_vtable(&v.name)?[cell].vthunk() else {
                continue;
            };
            let thunk = thunk.to_string();

            // The layout class of the sub-vtable owning this cell names
            // the clone.
            let order = cha.vtable_order(&v.name, cell as u64)?;
            let sub = VtableId::new(v.name.clone(), order);
            let layout_class = cha.layout_class(&sub)?.to_string();
            let new_name = new_vthunk_name(&layout_class, &thunk);
            if module.contains_function(&new_name) {
                continue;
            }

            let clone = module.clone_function(&thunk, &new_name)?;
            created += 1;
            if !rewrite_literals {
                continue;
            }

            for inst in &mut clone.insts {
                let Inst::VCallIndex { byte_offset } = *inst else {
                    continue;
                };
                let old_index = byte_offset / WORD_WIDTH;
                let new_index = translate_index(cha, plan, &sub, old_index)?;
                *inst = Inst::ConstInt(new_index * WORD_WIDTH);
            }
            debug!(
                "rewrote thunk '{}' as '{}' for layout class '{}'",
                thunk, new_name, layout_class
            );
        }
    }

    Ok(created)
}
