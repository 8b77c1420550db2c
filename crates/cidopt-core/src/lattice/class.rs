use crate::bound::FunctionId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable index of a class in the [`ClassLattice`](super::ClassLattice) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn from_u32(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable index of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Class,
    Abstract,
    Interface,
}

impl Default for ClassKind {
    fn default() -> Self {
        ClassKind::Class
    }
}

/// A method declared (not inherited) by a class or interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDecl {
    /// Implementing function; `None` for abstract methods and bodiless
    /// interface members
    pub function: Option<FunctionId>,
    pub is_final: bool,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub owner: ClassId,
    /// Private fields can only be written from code of the owning class,
    /// which the analysis treats as closed-world.
    pub is_private: bool,
}

/// A class participating in the lattice, with the encoder's slots
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: String,
    pub kind: ClassKind,
    pub base: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    /// Declared virtual, abstract, overriding, or implementing an interface
    pub polymorphic: bool,
    pub methods: IndexMap<String, MethodDecl>,
    pub fields: Vec<FieldId>,

    pub level: u32,
    pub priority: u32,
    pub non_leaf: bool,
    pub key: u64,
    pub cid: u64,
}

impl ClassNode {
    pub(crate) fn new(name: String, kind: ClassKind) -> Self {
        Self {
            name,
            kind,
            base: None,
            interfaces: Vec::new(),
            polymorphic: kind != ClassKind::Class,
            methods: IndexMap::new(),
            fields: Vec::new(),
            level: 0,
            priority: 0,
            non_leaf: false,
            key: 0,
            cid: 0,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    /// Only plain classes can be constructed
    pub fn is_concrete(&self) -> bool {
        self.kind == ClassKind::Class
    }

    pub fn is_leaf_candidate(&self) -> bool {
        !self.non_leaf
    }

    pub fn is_encoded(&self) -> bool {
        self.cid != 0
    }

    /// Clear the slots the encoder recomputes before assigning keys
    pub(crate) fn reset_layout(&mut self) {
        self.level = 0;
        self.priority = 0;
        self.non_leaf = false;
    }
}
