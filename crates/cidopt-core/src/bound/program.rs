use super::{BoundFunction, FunctionId};
use crate::lattice::{ClassId, ClassLattice};
use rustc_hash::FxHashMap;

/// Signature-level facts about every function of the program
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub owner: Option<ClassId>,
    /// Called directly from a unit other than the one holding its body
    pub called_across_units: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FunctionTable {
    functions: Vec<FunctionInfo>,
    by_name: FxHashMap<String, FunctionId>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a function; returns `None` when the name is taken
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        owner: Option<ClassId>,
    ) -> Option<FunctionId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return None;
        }
        let id = FunctionId(self.functions.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.functions.push(FunctionInfo {
            name,
            owner,
            called_across_units: false,
        });
        Some(id)
    }

    pub fn get(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.index()]
    }

    /// Record a direct call reaching `id` from outside its own unit
    pub fn mark_called_across_units(&mut self, id: FunctionId) {
        self.functions[id.index()].called_across_units = true;
    }

    pub fn name(&self, id: FunctionId) -> &str {
        &self.functions[id.index()].name
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &FunctionInfo)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, info)| (FunctionId(i as u32), info))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// One separately compiled unit: the bodies devirtualization sees at once
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    pub name: String,
    pub functions: Vec<BoundFunction>,
}

impl CompilationUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, id: FunctionId) -> Option<&BoundFunction> {
        self.functions.iter().find(|f| f.id == id)
    }
}

/// A fully bound program: the class lattice, the function table and the
/// units whose bodies are available
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub lattice: ClassLattice,
    pub functions: FunctionTable,
    pub units: Vec<CompilationUnit>,
}
