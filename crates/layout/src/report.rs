//! Serializable summary of a planned layout.
//!
//! Downstream passes persist this next to the transformed module so the
//! planned layout can be inspected or replayed without re-running the
//! planner. The core itself never writes it to disk.

use crate::{LayoutMode, LayoutPlan, LayoutSlot, Result};
use serde::{Deserialize, Serialize};
use vtweave_core::{ClassHierarchy, VtableId};

/// One slot of a planned cloud; pad slots carry no vtable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotReport {
    pub position: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vtable: Option<VtableId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_pos: Option<i64>,
}

/// Planning results for one vtable of a cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VtableReport {
    pub vtable: VtableId,
    pub pre_pad: u64,
    /// New position of every old cell, prepadded range included.
    pub new_positions: Vec<u64>,
}

/// Planning results for one cloud root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudReport {
    pub root: String,
    pub mode: LayoutMode,
    pub alignment: u64,
    pub slots: Vec<SlotReport>,
    pub vtables: Vec<VtableReport>,
}

/// Complete planning summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutReport {
    pub clouds: Vec<CloudReport>,
}

impl LayoutReport {
    /// Captures every planned cloud of `plan`.
    pub fn from_plan(cha: &ClassHierarchy, plan: &LayoutPlan) -> Result<Self> {
        let mut clouds = Vec::new();
        let roots: Vec<String> = plan.planned_roots().map(str::to_string).collect();
        for root in &roots {
            let slots = plan
                .interleaving(root)?
                .iter()
                .enumerate()
                .map(|(i, slot)| match slot {
                    LayoutSlot::Pad => SlotReport {
                        position: i as u64,
                        vtable: None,
                        old_pos: None,
                    },
                    LayoutSlot::Cell { v, old_pos } => SlotReport {
                        position: i as u64,
                        vtable: Some(v.clone()),
                        old_pos: Some(*old_pos),
                    },
                })
                .collect();

            let mut vtables = Vec::new();
            for v in cha.preorder(&VtableId::primary(root.clone())) {
                if !plan.is_planned(&v) {
                    continue;
                }
                vtables.push(VtableReport {
                    pre_pad: plan.pre_pad(&v),
                    new_positions: plan.new_inds(&v)?.to_vec(),
                    vtable: v,
                });
            }

            clouds.push(CloudReport {
                root: root.clone(),
                mode: plan.mode(),
                alignment: plan.alignment(root)?,
                slots,
                vtables,
            });
        }
        Ok(Self { clouds })
    }

    /// Pretty-printed JSON for humans and diffs.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Compact JSON for machine consumers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
