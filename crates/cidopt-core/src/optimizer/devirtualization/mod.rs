//! Devirtualization via reaching-class analysis
//!
//! Per compiled unit: build a flow graph of every body, propagate the
//! concrete classes each construction produces to a fixed point, then check
//! every virtual call site. A site whose receiver can only hold classes that
//! all dispatch to one implementation becomes a direct call.
//!
//! Units are independent: each run owns its graph and only reads the shared
//! class lattice.

mod builder;
mod graph;
mod propagate;
mod resolver;

pub use builder::{build_flow_graph, FlowGraphBuilder};
pub use graph::{TypePropagationGraph, TypeVariableNode, VarId, VarOrigin, VirtualCallSite};
pub use propagate::{propagate, PropagationStats};
pub use resolver::{CallDecision, CallSiteResolver, KeepReason, Resolution};

use crate::bound::{CompilationUnit, FunctionTable};
use crate::errors::ResolveError;
use crate::lattice::ClassLattice;
use tracing::info;

/// Outcome of the pass on one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: String,
    pub decisions: Vec<Resolution>,
    pub devirtualized: usize,
    pub kept: usize,
    pub stats: PropagationStats,
}

pub struct DevirtualizationPass<'a> {
    lattice: &'a ClassLattice,
    functions: &'a FunctionTable,
}

impl<'a> DevirtualizationPass<'a> {
    pub fn new(lattice: &'a ClassLattice, functions: &'a FunctionTable) -> Self {
        Self { lattice, functions }
    }

    pub fn run(&self, unit: &CompilationUnit) -> Result<UnitReport, ResolveError> {
        self.run_with_graph(unit).map(|(report, _)| report)
    }

    /// Like [`run`](Self::run), also handing back the propagated graph for dumps
    pub fn run_with_graph(
        &self,
        unit: &CompilationUnit,
    ) -> Result<(UnitReport, TypePropagationGraph), ResolveError> {
        let mut graph = build_flow_graph(self.lattice, self.functions, unit);
        let stats = propagate(&mut graph);
        let decisions = CallSiteResolver::new(self.lattice).resolve(&graph)?;

        let devirtualized = decisions
            .iter()
            .filter(|r| r.decision.is_devirtualized())
            .count();
        let kept = decisions.len() - devirtualized;
        info!(
            "Devirtualized {} of {} call sites in unit '{}' ({} propagation steps)",
            devirtualized,
            decisions.len(),
            unit.name,
            stats.iterations
        );

        let report = UnitReport {
            unit: unit.name.clone(),
            decisions,
            devirtualized,
            kept,
            stats,
        };
        Ok((report, graph))
    }
}
