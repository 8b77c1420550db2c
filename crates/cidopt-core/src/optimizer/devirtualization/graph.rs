use crate::bound::{CallSiteId, FunctionId, LocalId, MethodGroup};
use crate::lattice::{ClassId, FieldId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Index of a node in a [`TypePropagationGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Program location a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOrigin {
    Local { function: FunctionId, local: LocalId },
    This { function: FunctionId },
    Return { function: FunctionId },
    /// One node per field and unit, shared by every object of the owner class
    Field { field: FieldId },
    /// Intermediate value: call result, conditional join, conversion
    Temp { function: FunctionId, index: u32 },
}

impl fmt::Display for VarOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarOrigin::Local { function, local } => {
                write!(f, "f{}.l{}", function.as_u32(), local.0)
            }
            VarOrigin::This { function } => write!(f, "f{}.this", function.as_u32()),
            VarOrigin::Return { function } => write!(f, "f{}.ret", function.as_u32()),
            VarOrigin::Field { field } => write!(f, "field{}", field.as_u32()),
            VarOrigin::Temp { function, index } => {
                write!(f, "f{}.t{}", function.as_u32(), index)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeVariableNode {
    pub id: VarId,
    pub origin: VarOrigin,
    /// Concrete classes known to reach this location
    pub reaching: FxHashSet<ClassId>,
    /// Values produced outside the unit may reach this location
    pub open: bool,
    /// Successors: everything reaching this node also reaches them
    pub edges: FxHashSet<VarId>,
    /// Classes a checked cast lets through; `None` admits every class
    pub filter: Option<FxHashSet<ClassId>>,
    /// Set by the propagator; only read by dumps
    pub visited: bool,
}

/// A virtual or interface dispatch found while building the graph
#[derive(Debug, Clone)]
pub struct VirtualCallSite {
    pub site: CallSiteId,
    pub receiver: VarId,
    pub method: MethodGroup,
    /// Function whose body contains the call
    pub function: FunctionId,
}

/// Flow graph of one compiled unit
#[derive(Debug, Default, Clone)]
pub struct TypePropagationGraph {
    nodes: Vec<TypeVariableNode>,
    call_sites: Vec<VirtualCallSite>,
    by_receiver: FxHashMap<VarId, Vec<usize>>,
}

impl TypePropagationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, origin: VarOrigin) -> VarId {
        let id = VarId(self.nodes.len() as u32);
        self.nodes.push(TypeVariableNode {
            id,
            origin,
            reaching: FxHashSet::default(),
            open: false,
            edges: FxHashSet::default(),
            filter: None,
            visited: false,
        });
        id
    }

    /// Add `from -> to`; self loops carry no information and are dropped
    pub fn add_edge(&mut self, from: VarId, to: VarId) {
        if from != to {
            self.nodes[from.index()].edges.insert(to);
        }
    }

    /// Make `var` a source of `class`
    pub fn seed(&mut self, var: VarId, class: ClassId) {
        self.nodes[var.index()].reaching.insert(class);
    }

    /// Only classes in `admitted` may flow into `var`
    pub fn restrict(&mut self, var: VarId, admitted: FxHashSet<ClassId>) {
        self.nodes[var.index()].filter = Some(admitted);
    }

    pub fn mark_open(&mut self, var: VarId) {
        self.nodes[var.index()].open = true;
    }

    pub fn add_call_site(&mut self, call_site: VirtualCallSite) {
        self.by_receiver
            .entry(call_site.receiver)
            .or_default()
            .push(self.call_sites.len());
        self.call_sites.push(call_site);
    }

    pub fn node(&self, id: VarId) -> &TypeVariableNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: VarId) -> &mut TypeVariableNode {
        &mut self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[TypeVariableNode] {
        &self.nodes
    }

    pub fn call_sites(&self) -> &[VirtualCallSite] {
        &self.call_sites
    }

    /// Call sites dispatching on `receiver`
    pub fn call_sites_on(&self, receiver: VarId) -> impl Iterator<Item = &VirtualCallSite> {
        self.by_receiver
            .get(&receiver)
            .into_iter()
            .flatten()
            .map(|&i| &self.call_sites[i])
    }

    /// First node standing for `origin`
    pub fn find(&self, origin: VarOrigin) -> Option<VarId> {
        self.nodes.iter().find(|n| n.origin == origin).map(|n| n.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }
}
