use super::graph::{TypePropagationGraph, VirtualCallSite};
use crate::bound::{CallSiteId, FunctionId};
use crate::errors::ResolveError;
use crate::lattice::{ClassId, ClassLattice};
use serde::Serialize;
use tracing::debug;

/// Why a call site keeps its indirect dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeepReason {
    /// No class reaches the receiver: the call is dead code
    Unreachable,
    /// The receiver may hold objects produced outside the unit
    OpenReceiver,
    /// Reaching classes dispatch to different implementations
    Polymorphic { targets: Vec<FunctionId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallDecision {
    Devirtualize { target: FunctionId },
    KeepVirtual { reason: KeepReason },
}

impl CallDecision {
    pub fn is_devirtualized(&self) -> bool {
        matches!(self, CallDecision::Devirtualize { .. })
    }

    pub fn target(&self) -> Option<FunctionId> {
        match self {
            CallDecision::Devirtualize { target } => Some(*target),
            CallDecision::KeepVirtual { .. } => None,
        }
    }
}

/// Decision for one call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub site: CallSiteId,
    /// Function containing the call
    pub function: FunctionId,
    pub method: String,
    pub decision: CallDecision,
}

pub struct CallSiteResolver<'a> {
    lattice: &'a ClassLattice,
}

impl<'a> CallSiteResolver<'a> {
    pub fn new(lattice: &'a ClassLattice) -> Self {
        Self { lattice }
    }

    /// Decide every call site of a propagated graph, in registration order
    pub fn resolve(&self, graph: &TypePropagationGraph) -> Result<Vec<Resolution>, ResolveError> {
        graph
            .call_sites()
            .iter()
            .map(|call_site| {
                let decision = self.resolve_site(graph, call_site)?;
                debug!("{} .{}: {:?}", call_site.site, call_site.method.name, decision);
                Ok(Resolution {
                    site: call_site.site,
                    function: call_site.function,
                    method: call_site.method.name.clone(),
                    decision,
                })
            })
            .collect()
    }

    pub fn resolve_site(
        &self,
        graph: &TypePropagationGraph,
        call_site: &VirtualCallSite,
    ) -> Result<CallDecision, ResolveError> {
        // Whatever reaches the receiver, a final method has one implementation
        if let Some(target) = self
            .lattice
            .final_implementation(call_site.method.declaring, &call_site.method.name)
        {
            return Ok(CallDecision::Devirtualize { target });
        }

        let receiver = graph.node(call_site.receiver);
        if receiver.open {
            return Ok(CallDecision::KeepVirtual {
                reason: KeepReason::OpenReceiver,
            });
        }

        // Flow is type-blind, so only classes the call is typed for count
        let mut classes: Vec<ClassId> = receiver
            .reaching
            .iter()
            .copied()
            .filter(|&class| self.lattice.is_subtype_of(class, call_site.method.declaring))
            .collect();
        if classes.is_empty() {
            return Ok(CallDecision::KeepVirtual {
                reason: KeepReason::Unreachable,
            });
        }
        classes.sort();

        let mut targets = Vec::with_capacity(1);
        for class in classes {
            let target = self
                .lattice
                .resolve_method(class, &call_site.method.name)
                .ok_or_else(|| ResolveError::UnresolvedMethod {
                    class: self.lattice.name(class).to_string(),
                    method: call_site.method.name.clone(),
                    site: call_site.site.0,
                })?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        if let [target] = targets[..] {
            Ok(CallDecision::Devirtualize { target })
        } else {
            targets.sort();
            Ok(CallDecision::KeepVirtual {
                reason: KeepReason::Polymorphic { targets },
            })
        }
    }
}
