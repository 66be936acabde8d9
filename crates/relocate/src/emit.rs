//! New-vtable emission and old-use relocation.
//!
//! Builds one `_SD` global per cloud from the planned slot list, then
//! redirects every constructor-side use of the cloud's old vtables into
//! it. Old globals and original thunks are retired afterwards, once no
//! cloud can reference them anymore.

use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;
use vtweave_core::{
    is_vthunk, new_vtable_name, new_vthunk_name, ClassHierarchy, GlobalArray, Inst, Linkage,
    Module, VtableElem, VtableId,
};
use vtweave_layout::index::new_index_of;
use vtweave_layout::ranges::{addr_const, AddrConst};
use vtweave_layout::{LayoutPlan, LayoutSlot};

/// Rewrites a module onto a planned layout.
///
/// Keeps the cross-cloud bookkeeping the passes need: which `_SD` global
/// belongs to which root, the new start-address constant of every defined
/// vtable, and the original thunks queued for deletion.
#[derive(Debug, Default)]
pub struct Relocator {
    cloud_starts: BTreeMap<String, String>,
    start_addrs: HashMap<VtableId, AddrConst>,
    thunks_to_remove: BTreeSet<String>,
}

impl Relocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emitted `_SD` global name per cloud root.
    pub fn cloud_starts(&self) -> &BTreeMap<String, String> {
        &self.cloud_starts
    }

    /// The registered start-address constant of a defined vtable.
    pub fn vtable_range_start(&self, v: &VtableId) -> Option<&AddrConst> {
        self.start_addrs.get(v)
    }

    /// Emits the new global for `root` and redirects every use of the
    /// cloud's old vtables into it. Returns how many uses were redirected.
    pub fn create_new_vtable(
        &mut self,
        module: &mut Module,
        cha: &ClassHierarchy,
        plan: &LayoutPlan,
        root: &str,
    ) -> Result<usize> {
        let slots = plan.interleaving(root)?;
        let new_name = new_vtable_name(root);

        let mut elems = Vec::with_capacity(slots.len());
        for slot in slots {
            elems.push(self.new_vtable_elem(module, cha, slot)?);
        }

        module.add_global(GlobalArray {
            name: new_name.clone(),
            elems,
            align: plan.alignment(root)?,
            linkage: Linkage::Internal,
            unnamed_addr: true,
        })?;
        self.cloud_starts.insert(new_name.clone(), root.to_string());
        debug!("emitted '{}' with {} slots", new_name, slots.len());

        let mut redirected = 0;
        for v in cha.preorder(&VtableId::primary(root)) {
            if cha.is_defined(&v) {
                if self.start_addrs.contains_key(&v) {
                    return Err(Error::DuplicateStartAddr(v));
                }
                self.start_addrs
                    .insert(v.clone(), addr_const(cha, plan, &v)?);
            }
            if cha.is_undefined_class(&v.name) {
                continue;
            }
            redirected += self.redirect_uses(module, cha, plan, &v, &new_name)?;
        }
        Ok(redirected)
    }

    /// The new initializer cell for one planned slot. Padding, undefined
    /// owners and prepad positions become null; thunks are swapped for
    /// their rewritten clones; everything else carries over unchanged.
    fn new_vtable_elem(
        &mut self,
        module: &Module,
        cha: &ClassHierarchy,
        slot: &LayoutSlot,
    ) -> Result<VtableElem> {
        let LayoutSlot::Cell { v, old_pos } = slot else {
            return Ok(VtableElem::Null);
        };
        if cha.is_undefined_class(&v.name) {
            return Ok(VtableElem::Null);
        }
        let r = cha.range(v)?;
        if *old_pos < r.first as i64 {
            return Ok(VtableElem::Null);
        }

        let old = cha.old_vtable(&v.name)?;
        let elem = old
            .get(*old_pos as usize)
            .cloned()
            .ok_or(vtweave_core::Error::OldVtableTooShort {
                name: v.name.clone(),
                required: *old_pos as u64,
                len: old.len(),
            })?;

        if let Some(thunk) = elem.vthunk() {
            let clone = new_vthunk_name(cha.layout_class(v)?, thunk);
            if !module.contains_function(&clone) {
                return Err(Error::MissingThunkClone(clone));
            }
            self.thunks_to_remove.insert(thunk.to_string());
            Ok(VtableElem::FunctionBitcast(clone))
        } else {
            Ok(elem)
        }
    }

    /// Redirects the uses of `v`'s old global that go through `v`'s own
    /// address point. Uses of sibling sub-vtables are left to their turn;
    /// non-gep uses are contract violations.
    fn redirect_uses(
        &self,
        module: &mut Module,
        cha: &ClassHierarchy,
        plan: &LayoutPlan,
        v: &VtableId,
        new_global: &str,
    ) -> Result<usize> {
        // Snapshot before rewriting; the use list mutates under us.
        let users = module.users_of_global(&v.name);
        let mut redirected = 0;

        for use_ref in users {
            let inst = module.inst(&use_ref).cloned();
            match inst {
                Some(Inst::VtableGep { index, .. }) => {
                    if index < 0 || !cha.has_addr_pt(&v.name, index as u64) {
                        return Err(Error::UnknownAddressPoint {
                            name: v.name.clone(),
                            index,
                        });
                    }
                    let order = cha.addr_pt_order(&v.name, index as u64)?;
                    if order != v.sub {
                        continue;
                    }

                    let r = cha.range(v)?;
                    let new_index = new_index_of(plan, v, index as u64 - r.first)?;
                    module.replace_inst(
                        &use_ref,
                        Inst::VtableGep {
                            global: new_global.to_string(),
                            index: new_index as i64,
                        },
                    )?;
                    redirected += 1;
                }
                Some(_) => {
                    return Err(Error::NonGepUse {
                        global: v.name.clone(),
                        function: use_ref.function,
                    });
                }
                None => {}
            }
        }
        Ok(redirected)
    }

    /// Deletes every old vtable global, then sweeps thunks to a fixpoint:
    /// the recorded originals first, then any virtual thunk left without
    /// references (removals can strand further thunks, hence the loop).
    pub fn remove_old_layouts(
        &mut self,
        module: &mut Module,
        cha: &ClassHierarchy,
    ) -> Result<(usize, usize)> {
        let mut globals_removed = 0;
        let names: Vec<String> = cha.old_vtable_names().map(str::to_string).collect();
        for name in names {
            if !module.contains_global(&name) {
                continue;
            }
            module.remove_global(&name)?;
            globals_removed += 1;
        }

        let mut thunks_removed = 0;
        loop {
            while let Some(name) = self.thunks_to_remove.pop_first() {
                if module.contains_function(&name) {
                    module.remove_function(&name)?;
                    thunks_removed += 1;
                }
            }
            for name in module.function_names() {
                if is_vthunk(&name) && module.function_ref_count(&name) == 0 {
                    self.thunks_to_remove.insert(name);
                }
            }
            if self.thunks_to_remove.is_empty() {
                break;
            }
        }

        debug!(
            "removed {} old vtable globals and {} thunks",
            globals_removed, thunks_removed
        );
        Ok((globals_removed, thunks_removed))
    }
}
