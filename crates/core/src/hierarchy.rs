//! Class-hierarchy oracle.
//!
//! The hierarchy is an inheritance forest over sub-vtables: nodes are
//! [`VtableId`]s, edges run parent to child, and every tree is rooted at a
//! primary vtable (the "cloud" of that root). The oracle is read-only once
//! built; [`HierarchyBuilder`] performs all structural validation up front
//! so the planner can rely on its invariants.

use crate::module::VtableElem;
use crate::result::{Error, Result};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Identifies one sub-vtable: the most-derived class owning the vtable
/// array plus the position of the sub-vtable within it. `(name, 0)` is
/// the primary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VtableId {
    /// Name of the class whose vtable array owns the cells.
    pub name: String,
    /// Which sub-vtable within that array (0 = primary).
    pub sub: u64,
}

impl VtableId {
    pub fn new(name: impl Into<String>, sub: u64) -> Self {
        Self {
            name: name.into(),
            sub,
        }
    }

    /// The primary sub-vtable of a class.
    pub fn primary(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }
}

impl fmt::Display for VtableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.name, self.sub)
    }
}

/// Closed interval of old-array cell indices belonging to one sub-vtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// First cell of the sub-vtable.
    pub first: u64,
    /// Last cell of the sub-vtable (inclusive).
    pub last: u64,
}

impl Range {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    /// Number of cells in the sub-vtable.
    pub fn size(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn contains(&self, index: u64) -> bool {
        self.first <= index && index <= self.last
    }
}

/// One sub-vtable declaration within a class.
#[derive(Debug, Clone)]
pub struct SubVtable {
    /// Cells of the owning class's old array belonging to this sub-vtable.
    pub range: Range,
    /// The cell a concrete object's vptr points at.
    pub addr_pt: u64,
    /// Layout-holder class; thunk clones are named after it.
    pub layout_class: String,
}

impl SubVtable {
    pub fn new(first: u64, last: u64, addr_pt: u64, layout_class: impl Into<String>) -> Self {
        Self {
            range: Range::new(first, last),
            addr_pt,
            layout_class: layout_class.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct ClassInfo {
    subs: Vec<SubVtable>,
    old_vtable: Option<Vec<VtableElem>>,
    undefined: bool,
}

/// Read-only oracle over the inheritance forest.
///
/// Children keep the order they were declared in; `preorder` visits a
/// node before its subtree and subtrees in child order, which is the
/// traversal every planning pass assumes.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    graph: StableDiGraph<VtableId, ()>,
    nodes: HashMap<VtableId, NodeIndex>,
    classes: BTreeMap<String, ClassInfo>,
    roots: Vec<String>,
    ancestors: HashMap<VtableId, String>,
}

impl ClassHierarchy {
    /// Cloud roots, in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }

    pub fn is_root(&self, name: &str) -> bool {
        self.roots.iter().any(|r| r == name)
    }

    /// Direct children of `v`, in declaration order.
    pub fn children(&self, v: &VtableId) -> Vec<VtableId> {
        let Some(&idx) = self.nodes.get(v) else {
            return Vec::new();
        };
        // petgraph yields neighbors most-recent-edge first; reverse to
        // restore declaration order.
        let mut out: Vec<VtableId> = self.graph.neighbors(idx).map(|n| self.graph[n].clone()).collect();
        out.reverse();
        out
    }

    /// The subtree rooted at `v`, self first, children in declaration order.
    pub fn preorder(&self, v: &VtableId) -> Vec<VtableId> {
        let mut out = Vec::new();
        self.preorder_into(v, &mut out);
        out
    }

    fn preorder_into(&self, v: &VtableId, out: &mut Vec<VtableId>) {
        out.push(v.clone());
        for child in self.children(v) {
            self.preorder_into(&child, out);
        }
    }

    pub fn knows_about(&self, v: &VtableId) -> bool {
        self.nodes.contains_key(v)
    }

    /// True when the class behind `v` is defined in this module.
    pub fn is_defined(&self, v: &VtableId) -> bool {
        self.classes
            .get(&v.name)
            .map(|c| !c.undefined)
            .unwrap_or(false)
    }

    /// True when the class is only known by declaration.
    pub fn is_undefined_class(&self, name: &str) -> bool {
        self.classes.get(name).map(|c| c.undefined).unwrap_or(true)
    }

    pub fn has_old_vtable(&self, name: &str) -> bool {
        self.classes
            .get(name)
            .map(|c| c.old_vtable.is_some())
            .unwrap_or(false)
    }

    /// The class's original vtable array.
    pub fn old_vtable(&self, name: &str) -> Result<&[VtableElem]> {
        self.classes
            .get(name)
            .and_then(|c| c.old_vtable.as_deref())
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    /// Names of every class that carries an old vtable array, sorted.
    pub fn old_vtable_names(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .filter(|(_, c)| c.old_vtable.is_some())
            .map(|(name, _)| name.as_str())
    }

    fn sub(&self, v: &VtableId) -> Result<&SubVtable> {
        let class = self
            .classes
            .get(&v.name)
            .ok_or_else(|| Error::UnknownClass(v.name.clone()))?;
        class.subs.get(v.sub as usize).ok_or(Error::NoSuchSubVtable {
            name: v.name.clone(),
            sub: v.sub,
        })
    }

    pub fn range(&self, v: &VtableId) -> Result<Range> {
        Ok(self.sub(v)?.range)
    }

    pub fn addr_pt(&self, v: &VtableId) -> Result<u64> {
        Ok(self.sub(v)?.addr_pt)
    }

    /// The `k`-th address point of the class's vtable array.
    pub fn addr_pt_of_order(&self, name: &str, k: u64) -> Result<u64> {
        self.addr_pt(&VtableId::new(name, k))
    }

    pub fn num_addr_pts(&self, name: &str) -> usize {
        self.classes.get(name).map(|c| c.subs.len()).unwrap_or(0)
    }

    pub fn has_addr_pt(&self, name: &str, index: u64) -> bool {
        self.classes
            .get(name)
            .map(|c| c.subs.iter().any(|s| s.addr_pt == index))
            .unwrap_or(false)
    }

    /// Which sub-vtable has its address point at old cell `index`.
    pub fn addr_pt_order(&self, name: &str, index: u64) -> Result<u64> {
        let class = self
            .classes
            .get(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        class
            .subs
            .iter()
            .position(|s| s.addr_pt == index)
            .map(|p| p as u64)
            .ok_or(Error::NoSuchAddressPoint {
                name: name.to_string(),
                index,
            })
    }

    /// Which sub-vtable owns old cell `index` of the class's array.
    pub fn vtable_order(&self, name: &str, index: u64) -> Result<u64> {
        let class = self
            .classes
            .get(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        class
            .subs
            .iter()
            .position(|s| s.range.contains(index))
            .map(|p| p as u64)
            .ok_or(Error::CellOutsideSubVtables {
                name: name.to_string(),
                index,
            })
    }

    pub fn layout_class(&self, v: &VtableId) -> Result<&str> {
        Ok(self.sub(v)?.layout_class.as_str())
    }

    /// Root of the cloud containing `v`.
    pub fn ancestor(&self, v: &VtableId) -> Result<&str> {
        self.ancestors
            .get(v)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownVtable(v.clone()))
    }

    pub fn has_first_defined_descendant(&self, v: &VtableId) -> bool {
        self.first_defined_descendant(v).is_some()
    }

    /// First defined vtable in preorder of `v`'s subtree (`v` included).
    pub fn first_defined_descendant(&self, v: &VtableId) -> Option<VtableId> {
        self.preorder(v).into_iter().find(|d| self.is_defined(d))
    }

    /// Drops every analysis structure; the oracle is unusable afterwards.
    pub fn clear_analysis_results(&mut self) {
        self.graph.clear();
        self.nodes.clear();
        self.classes.clear();
        self.roots.clear();
        self.ancestors.clear();
        debug!("cleared class hierarchy analysis results");
    }
}

/// Builds and validates a [`ClassHierarchy`].
///
/// Also the stub-CHA vehicle for tests: declare classes, wire edges, pick
/// roots, call [`HierarchyBuilder::finish`].
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    classes: BTreeMap<String, ClassInfo>,
    class_order: Vec<String>,
    edges: Vec<(VtableId, VtableId)>,
    roots: Vec<String>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a defined class with its sub-vtables and old vtable array.
    pub fn add_class(&mut self, name: &str, subs: Vec<SubVtable>, old_vtable: Vec<VtableElem>) {
        self.class_order.push(name.to_string());
        self.classes.insert(
            name.to_string(),
            ClassInfo {
                subs,
                old_vtable: Some(old_vtable),
                undefined: false,
            },
        );
    }

    /// Declares a class known only by declaration: ranges and address
    /// points exist, but there is no array to relocate.
    pub fn add_undefined_class(&mut self, name: &str, subs: Vec<SubVtable>) {
        self.class_order.push(name.to_string());
        self.classes.insert(
            name.to_string(),
            ClassInfo {
                subs,
                old_vtable: None,
                undefined: true,
            },
        );
    }

    /// Marks the class's primary vtable as a cloud root.
    pub fn add_root(&mut self, name: &str) {
        self.roots.push(name.to_string());
    }

    /// Wires `child` under `parent`. Children keep insertion order.
    pub fn add_edge(&mut self, parent: VtableId, child: VtableId) {
        self.edges.push((parent, child));
    }

    pub fn finish(self) -> Result<ClassHierarchy> {
        let mut graph = StableDiGraph::new();
        let mut nodes: HashMap<VtableId, NodeIndex> = HashMap::new();

        for name in &self.class_order {
            let class = &self.classes[name];
            for (sub, decl) in class.subs.iter().enumerate() {
                let id = VtableId::new(name.clone(), sub as u64);
                if !decl.range.contains(decl.addr_pt) {
                    return Err(Error::AddressPointOutsideRange {
                        id,
                        addr_pt: decl.addr_pt,
                        first: decl.range.first,
                        last: decl.range.last,
                    });
                }
                if let Some(old) = &class.old_vtable {
                    if (old.len() as u64) < decl.range.last + 1 {
                        return Err(Error::OldVtableTooShort {
                            name: name.clone(),
                            required: decl.range.last,
                            len: old.len(),
                        });
                    }
                }
                let idx = graph.add_node(id.clone());
                nodes.insert(id, idx);
            }
        }

        for (parent, child) in &self.edges {
            let &p = nodes
                .get(parent)
                .ok_or_else(|| Error::UnknownVtable(parent.clone()))?;
            let &c = nodes
                .get(child)
                .ok_or_else(|| Error::UnknownVtable(child.clone()))?;
            if graph
                .neighbors_directed(c, petgraph::Direction::Incoming)
                .next()
                .is_some()
            {
                return Err(Error::SecondParent(child.clone()));
            }
            graph.add_edge(p, c, ());
        }

        for root in &self.roots {
            if !self.classes.contains_key(root) {
                return Err(Error::UnknownClass(root.clone()));
            }
        }

        let mut hierarchy = ClassHierarchy {
            graph,
            nodes,
            classes: self.classes,
            roots: self.roots,
            ancestors: HashMap::new(),
        };

        let roots = hierarchy.roots.clone();
        for root in &roots {
            for v in hierarchy.preorder(&VtableId::primary(root.clone())) {
                hierarchy.ancestors.insert(v, root.clone());
            }
        }

        Ok(hierarchy)
    }
}
