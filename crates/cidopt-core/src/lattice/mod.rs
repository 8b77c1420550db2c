//! Class lattice
//!
//! Arena of every class and interface of the program. Classes are addressed by
//! [`ClassId`] so analyses can keep index-based sets instead of hashing node
//! pointers. The encoder writes its results (`level`, `priority`, `key`, `cid`)
//! into the nodes; everything else is populated once by the binder.

mod class;
pub mod encoder;
pub mod prime;

pub use class::{ClassId, ClassKind, ClassNode, FieldDecl, FieldId, MethodDecl};
pub use encoder::{EncodingSummary, HierarchyEncoder};
pub use prime::{PrimeSupplier, TrialDivision};

use crate::bound::FunctionId;
use crate::errors::LatticeError;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default, Clone)]
pub struct ClassLattice {
    classes: Vec<ClassNode>,
    fields: Vec<FieldDecl>,
    by_name: FxHashMap<String, ClassId>,
}

impl ClassLattice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class or interface under its fully-qualified name
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        kind: ClassKind,
    ) -> Result<ClassId, LatticeError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(LatticeError::DuplicateClass(name));
        }
        let id = ClassId(self.classes.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.classes.push(ClassNode::new(name, kind));
        Ok(id)
    }

    pub fn set_base(&mut self, class: ClassId, base: ClassId) -> Result<(), LatticeError> {
        if self.classes[base.index()].is_interface() {
            return Err(LatticeError::BaseIsInterface {
                class: self.name(class).to_string(),
                base: self.name(base).to_string(),
            });
        }
        if self.classes[class.index()].is_interface() {
            return Err(LatticeError::InterfaceWithBase(self.name(class).to_string()));
        }
        self.classes[class.index()].base = Some(base);
        Ok(())
    }

    pub fn add_interface(&mut self, class: ClassId, iface: ClassId) -> Result<(), LatticeError> {
        if !self.classes[iface.index()].is_interface() {
            return Err(LatticeError::NotAnInterface(self.name(iface).to_string()));
        }
        let node = &mut self.classes[class.index()];
        if !node.interfaces.contains(&iface) {
            node.interfaces.push(iface);
        }
        if !node.is_interface() {
            node.polymorphic = true;
        }
        Ok(())
    }

    pub fn set_polymorphic(&mut self, class: ClassId, polymorphic: bool) {
        self.classes[class.index()].polymorphic = polymorphic;
    }

    pub fn add_method(&mut self, class: ClassId, name: impl Into<String>, decl: MethodDecl) {
        self.classes[class.index()].methods.insert(name.into(), decl);
    }

    pub fn add_field(
        &mut self,
        owner: ClassId,
        name: impl Into<String>,
        is_private: bool,
    ) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldDecl {
            name: name.into(),
            owner,
            is_private,
        });
        self.classes[owner.index()].fields.push(id);
        id
    }

    pub fn get(&self, id: ClassId) -> &ClassNode {
        &self.classes[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ClassId) -> &mut ClassNode {
        &mut self.classes[id.index()]
    }

    pub fn contains(&self, id: ClassId) -> bool {
        id.index() < self.classes.len()
    }

    pub fn field(&self, id: FieldId) -> &FieldDecl {
        &self.fields[id.index()]
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Find a field declared by `class` or any of its ancestors
    pub fn lookup_field(&self, class: ClassId, name: &str) -> Option<FieldId> {
        std::iter::once(class)
            .chain(self.ancestors(class))
            .flat_map(|c| self.get(c).fields.iter().copied())
            .find(|&f| self.field(f).name == name)
    }

    pub fn name(&self, id: ClassId) -> &str {
        &self.classes[id.index()].name
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.classes.len() as u32).map(ClassId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &ClassNode)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, node)| (ClassId(i as u32), node))
    }

    /// Strict ancestors of `id`, nearest first.
    ///
    /// The walk is bounded by the lattice size so a cyclic base chain (a
    /// binder bug the encoder reports) cannot hang callers.
    pub fn ancestors(&self, id: ClassId) -> Ancestors<'_> {
        Ancestors {
            lattice: self,
            next: self.get(id).base,
            remaining: self.classes.len(),
        }
    }

    /// `true` when `class` is `target` or derives from it.
    ///
    /// Once both classes carry a Cid this is the divisibility test the code
    /// generator emits; before encoding it falls back to a chain walk.
    pub fn is_subclass_of(&self, class: ClassId, target: ClassId) -> bool {
        if class == target {
            return true;
        }
        let (c, t) = (self.get(class), self.get(target));
        if c.is_encoded() && t.is_encoded() {
            return c.cid % t.cid == 0;
        }
        self.ancestors(class).any(|a| a == target)
    }

    /// `true` when `class` (or an ancestor) implements `iface`, directly or
    /// through interface inheritance
    pub fn implements(&self, class: ClassId, iface: ClassId) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<ClassId> = std::iter::once(class)
            .chain(self.ancestors(class))
            .flat_map(|c| self.get(c).interfaces.iter().copied())
            .collect();
        if class == iface {
            return true;
        }
        while let Some(current) = stack.pop() {
            if current == iface {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.get(current).interfaces.iter().copied());
            }
        }
        false
    }

    pub fn is_subtype_of(&self, class: ClassId, target: ClassId) -> bool {
        if self.get(target).is_interface() {
            self.implements(class, target)
        } else {
            self.is_subclass_of(class, target)
        }
    }

    /// Resolve the implementation virtual dispatch would pick for `name` on an
    /// object whose runtime class is `class`.
    pub fn resolve_method(&self, class: ClassId, name: &str) -> Option<FunctionId> {
        let chain: Vec<ClassId> = std::iter::once(class).chain(self.ancestors(class)).collect();

        let from_classes = chain
            .iter()
            .filter_map(|&c| self.get(c).methods.get(name))
            .find_map(|decl| decl.function);
        if from_classes.is_some() {
            return from_classes;
        }

        // Interface default methods
        let mut seen = FxHashSet::default();
        let mut queue: std::collections::VecDeque<ClassId> = chain
            .iter()
            .flat_map(|&c| self.get(c).interfaces.iter().copied())
            .collect();
        while let Some(iface) = queue.pop_front() {
            if !seen.insert(iface) {
                continue;
            }
            if let Some(function) = self.get(iface).methods.get(name).and_then(|d| d.function) {
                return Some(function);
            }
            queue.extend(self.get(iface).interfaces.iter().copied());
        }
        None
    }

    /// Concrete classes whose instances are `target` values
    /// Implementation of `name` no subtype of `class` can override: the
    /// nearest declaration on `class` or its bases is final and has a body.
    pub fn final_implementation(&self, class: ClassId, name: &str) -> Option<FunctionId> {
        if self.get(class).is_interface() {
            return None;
        }
        let decl = std::iter::once(class)
            .chain(self.ancestors(class))
            .find_map(|c| self.get(c).methods.get(name))?;
        if decl.is_final {
            decl.function
        } else {
            None
        }
    }

    pub fn concrete_subtypes(&self, target: ClassId) -> Vec<ClassId> {
        self.iter()
            .filter(|(id, node)| node.is_concrete() && self.is_subtype_of(*id, target))
            .map(|(id, _)| id)
            .collect()
    }

    /// Classes taking part in polymorphic dispatch, closed under base links.
    ///
    /// A polymorphic class drags in its ancestors (their keys are factors of
    /// its Cid) and its descendants (they inherit its virtual methods).
    /// Interfaces are never part of the view.
    pub fn polymorphic_view(&self) -> Vec<ClassId> {
        let mut marked = vec![false; self.classes.len()];
        for (id, node) in self.iter() {
            if !node.is_interface() && (node.polymorphic || !node.interfaces.is_empty()) {
                marked[id.index()] = true;
                for ancestor in self.ancestors(id) {
                    marked[ancestor.index()] = true;
                }
            }
        }

        let mut in_view = marked.clone();
        for (id, node) in self.iter() {
            if !node.is_interface() && self.ancestors(id).any(|a| marked[a.index()]) {
                in_view[id.index()] = true;
            }
        }

        self.ids().filter(|id| in_view[id.index()]).collect()
    }
}

pub struct Ancestors<'a> {
    lattice: &'a ClassLattice,
    next: Option<ClassId>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = ClassId;

    fn next(&mut self) -> Option<ClassId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.lattice.get(current).base;
        Some(current)
    }
}
