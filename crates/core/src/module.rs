//! Abstract module IR.
//!
//! Only the operations the relocation passes need are modeled: named
//! global arrays of pointer-sized cells, functions whose bodies are flat
//! instruction lists, constant-gep uses of globals, and function cloning.
//! The module is the single mutable bundle handed through the pipeline.

use crate::is_vthunk;
use crate::result::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// One cell of a vtable array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtableElem {
    /// Null pointer (pure-virtual slots, padding, prepad cells).
    Null,
    /// Direct pointer to a named function.
    Function(String),
    /// Pointer-cast of a named function. Virtual thunks appear as this.
    FunctionBitcast(String),
    /// Any other constant; copied through unchanged, never inspected.
    Opaque(String),
}

impl VtableElem {
    /// The virtual thunk behind this cell, if there is one.
    pub fn vthunk(&self) -> Option<&str> {
        match self {
            VtableElem::FunctionBitcast(name) if is_vthunk(name) => Some(name),
            _ => None,
        }
    }

    fn function_name(&self) -> Option<&str> {
        match self {
            VtableElem::Function(name) | VtableElem::FunctionBitcast(name) => Some(name),
            _ => None,
        }
    }
}

/// Linkage of a module-level global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
}

/// A module-level constant array of pointer-sized cells.
#[derive(Debug, Clone)]
pub struct GlobalArray {
    pub name: String,
    pub elems: Vec<VtableElem>,
    /// Byte alignment of the emitted array.
    pub align: u64,
    pub linkage: Linkage,
    pub unnamed_addr: bool,
}

impl GlobalArray {
    /// An externally visible, word-aligned array; the shape old vtables
    /// arrive in.
    pub fn external(name: impl Into<String>, elems: Vec<VtableElem>) -> Self {
        Self {
            name: name.into(),
            elems,
            align: crate::WORD_WIDTH as u64,
            linkage: Linkage::External,
            unnamed_addr: false,
        }
    }
}

/// One instruction of a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// Constant `getelementptr global, 0, index` — the form constructors
    /// use to take a vtable address point.
    VtableGep { global: String, index: i64 },
    /// Call of the vcall-index intrinsic with a literal byte offset.
    VCallIndex { byte_offset: i64 },
    /// Integer literal; what a rewritten vcall-index call becomes.
    ConstInt(i64),
    /// A use of a global that is not a constant gep. The relocator treats
    /// these as contract violations when they name an old vtable.
    DirectGlobalRef { global: String },
    /// Anything the relocation passes never touch.
    Opaque,
}

impl Inst {
    fn global_used(&self) -> Option<&str> {
        match self {
            Inst::VtableGep { global, .. } | Inst::DirectGlobalRef { global } => Some(global),
            _ => None,
        }
    }
}

/// A function body: name plus a flat instruction list.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub insts: Vec<Inst>,
}

impl Function {
    pub fn new(name: impl Into<String>, insts: Vec<Inst>) -> Self {
        Self {
            name: name.into(),
            insts,
        }
    }
}

/// Location of one instruction-level use of a global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseRef {
    pub function: String,
    pub inst: usize,
}

/// The mutable IR bundle handed to the relocation passes.
#[derive(Debug, Clone, Default)]
pub struct Module {
    globals: BTreeMap<String, GlobalArray>,
    functions: BTreeMap<String, Function>,
    vcall_index_intrinsic: bool,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the vcall-index intrinsic as present. Without it, thunk
    /// literal rewriting is skipped.
    pub fn declare_vcall_index_intrinsic(&mut self) {
        self.vcall_index_intrinsic = true;
    }

    pub fn has_vcall_index_intrinsic(&self) -> bool {
        self.vcall_index_intrinsic
    }

    pub fn add_global(&mut self, global: GlobalArray) -> Result<()> {
        if self.globals.contains_key(&global.name) {
            return Err(Error::DuplicateGlobal(global.name));
        }
        self.globals.insert(global.name.clone(), global);
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<&GlobalArray> {
        self.globals.get(name)
    }

    pub fn contains_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// Removes a global. Fails while instruction-level uses remain.
    pub fn remove_global(&mut self, name: &str) -> Result<GlobalArray> {
        let uses = self.users_of_global(name).len();
        if uses != 0 {
            return Err(Error::GlobalInUse {
                name: name.to_string(),
                uses,
            });
        }
        self.globals
            .remove(name)
            .ok_or_else(|| Error::UnknownGlobal(name.to_string()))
    }

    pub fn add_function(&mut self, function: Function) -> Result<()> {
        if self.functions.contains_key(&function.name) {
            return Err(Error::DuplicateFunction(function.name));
        }
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Snapshot of every function name, sorted. Safe to iterate while
    /// removing functions.
    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Clones `src` under `new_name` and returns the clone for rewriting.
    pub fn clone_function(&mut self, src: &str, new_name: &str) -> Result<&mut Function> {
        if self.functions.contains_key(new_name) {
            return Err(Error::DuplicateFunction(new_name.to_string()));
        }
        let insts = self
            .functions
            .get(src)
            .ok_or_else(|| Error::UnknownFunction(src.to_string()))?
            .insts
            .clone();
        debug!("cloned function '{}' as '{}'", src, new_name);
        Ok(self
            .functions
            .entry(new_name.to_string())
            .or_insert(Function::new(new_name, insts)))
    }

    pub fn remove_function(&mut self, name: &str) -> Result<Function> {
        self.functions
            .remove(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Snapshot of every instruction-level use of the global, in function
    /// name order. Collected before rewriting so mutation cannot skip or
    /// revisit a use.
    pub fn users_of_global(&self, name: &str) -> Vec<UseRef> {
        let mut out = Vec::new();
        for (fname, function) in &self.functions {
            for (i, inst) in function.insts.iter().enumerate() {
                if inst.global_used() == Some(name) {
                    out.push(UseRef {
                        function: fname.clone(),
                        inst: i,
                    });
                }
            }
        }
        out
    }

    /// Number of references to the function from global initializers.
    pub fn function_ref_count(&self, name: &str) -> usize {
        self.globals
            .values()
            .flat_map(|g| g.elems.iter())
            .filter(|e| e.function_name() == Some(name))
            .count()
    }

    pub fn inst(&self, use_ref: &UseRef) -> Option<&Inst> {
        self.functions
            .get(&use_ref.function)
            .and_then(|f| f.insts.get(use_ref.inst))
    }

    pub fn replace_inst(&mut self, use_ref: &UseRef, inst: Inst) -> Result<()> {
        let function = self
            .functions
            .get_mut(&use_ref.function)
            .ok_or_else(|| Error::UnknownFunction(use_ref.function.clone()))?;
        let slot = function
            .insts
            .get_mut(use_ref.inst)
            .ok_or_else(|| Error::UnknownFunction(use_ref.function.clone()))?;
        *slot = inst;
        Ok(())
    }
}
