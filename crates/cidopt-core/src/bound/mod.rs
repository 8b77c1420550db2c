//! Bound program representation
//!
//! Function bodies as the binder hands them over: names already resolved to
//! ids, every call either statically bound or tagged as a virtual/interface
//! dispatch with its own call-site id.

pub mod description;
mod program;

pub use description::ProgramDescription;
pub use program::{CompilationUnit, FunctionInfo, FunctionTable, Program};

use crate::lattice::{ClassId, FieldId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
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

/// Local slot of one function; parameters occupy the first slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteId(pub u32);

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site{}", self.0)
    }
}

/// The statically named method of a virtual or interface call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodGroup {
    pub name: String,
    /// Class or interface the binder resolved the name against
    pub declaring: ClassId,
}

#[derive(Debug, Clone)]
pub struct BoundFunction {
    pub id: FunctionId,
    pub owner: Option<ClassId>,
    /// Instance method: `this` is available in the body
    pub has_this: bool,
    /// Callable from outside the compiled unit, so arguments are unknown
    pub exported: bool,
    pub params: Vec<LocalId>,
    pub local_count: u32,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let { local: LocalId, init: Option<Expr> },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub enum Place {
    Local(LocalId),
    Field { object: Box<Expr>, field: FieldId },
}

#[derive(Debug, Clone)]
pub enum Expr {
    /// Any non-object constant
    Literal,
    Null,
    Local(LocalId),
    This,
    New {
        class: ClassId,
        ctor: Option<FunctionId>,
        args: Vec<Expr>,
    },
    Assign { target: Place, value: Box<Expr> },
    Field { object: Box<Expr>, field: FieldId },
    /// Statically bound call, including non-virtual instance methods
    Call {
        target: FunctionId,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    VirtualCall {
        site: CallSiteId,
        receiver: Box<Expr>,
        method: MethodGroup,
        args: Vec<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// Implicit or explicit conversion to a supertype
    Convert { value: Box<Expr> },
    Cast { value: Box<Expr>, to: ClassId },
    /// Operator on non-object operands
    Binary { lhs: Box<Expr>, rhs: Box<Expr> },
}
