use crate::cache::CacheError;
use std::fmt;
use thiserror::Error;

/// Malformed lattice construction requests
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LatticeError {
    #[error("class '{0}' is declared more than once")]
    DuplicateClass(String),

    #[error("class '{class}' cannot extend interface '{base}'")]
    BaseIsInterface { class: String, base: String },

    #[error("interface '{0}' cannot have a base class")]
    InterfaceWithBase(String),

    #[error("'{0}' is not an interface")]
    NotAnInterface(String),
}

/// A class whose persisted Cid differs from the freshly computed one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidConflict {
    pub class: String,
    pub persisted: u64,
    pub computed: u64,
}

impl fmt::Display for CidConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: persisted cid {} but hierarchy now encodes {}",
            self.class, self.persisted, self.computed
        )
    }
}

fn join_conflicts(conflicts: &[CidConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of the class hierarchy encoder
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("internal error: base chain of '{class}' is cyclic")]
    Cycle { class: String },

    #[error("internal error: base '{base}' of '{class}' is not part of the encoded classes")]
    DanglingBase { class: String, base: String },

    #[error("internal error: interface '{0}' cannot receive a cid")]
    InterfaceInView(String),

    #[error("cid of '{class}' does not fit in 64 bits")]
    CidOverflow { class: String },

    #[error("{} class(es) cannot reproduce their persisted cid: {}", .conflicts.len(), join_conflicts(.conflicts))]
    StabilityConflict { conflicts: Vec<CidConflict> },
}

impl EncodeError {
    /// Contract violations from upstream, as opposed to build-consistency problems
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            EncodeError::Cycle { .. }
                | EncodeError::DanglingBase { .. }
                | EncodeError::InterfaceInView(_)
        )
    }
}

/// Failures turning a program description into bound ids
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error(transparent)]
    Lattice(#[from] LatticeError),

    #[error("unknown class '{name}' referenced from {context}")]
    UnknownClass { name: String, context: String },

    #[error("unknown function '{name}' referenced from {context}")]
    UnknownFunction { name: String, context: String },

    #[error("function '{0}' is declared more than once")]
    DuplicateFunction(String),

    #[error("unknown local '{name}' in function '{function}'")]
    UnknownLocal { name: String, function: String },

    #[error("unknown field '{field}' on class '{class}'")]
    UnknownField { class: String, field: String },

    #[error("'this' used in function '{0}' which has no receiver")]
    ThisOutsideMethod(String),

    #[error("unit '{unit}' lists function '{function}' which is already owned by unit '{owner}'")]
    FunctionInTwoUnits {
        unit: String,
        function: String,
        owner: String,
    },
}

/// Failures of the call-site resolver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("internal error: method '{method}' does not resolve on reaching class '{class}' (call site {site})")]
    UnresolvedMethod {
        class: String,
        method: String,
        site: u32,
    },
}

/// Top-level error of a compilation driven through [`crate::optimizer`]
#[derive(Debug, Error)]
pub enum CompilationError {
    #[error(transparent)]
    Lattice(#[from] LatticeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CompilationError {
    pub fn is_internal(&self) -> bool {
        match self {
            CompilationError::Encode(e) => e.is_internal(),
            CompilationError::Resolve(_) => true,
            _ => false,
        }
    }
}
