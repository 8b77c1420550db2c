//! Fixed-point propagation of reaching classes
//!
//! Classic worklist dataflow: a node whose facts grew is queued again so its
//! successors see the new classes. Facts only ever grow (set union for the
//! reaching set, logical or for `open`) over a finite class universe, so the
//! loop terminates.

use super::graph::{TypePropagationGraph, VarId};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStats {
    /// Nodes popped from the worklist
    pub iterations: usize,
    /// Successor updates that grew a node
    pub updates: usize,
}

/// Run the graph to its fixed point
pub fn propagate(graph: &mut TypePropagationGraph) -> PropagationStats {
    let mut stats = PropagationStats::default();
    let mut queued = vec![false; graph.len()];
    let mut work: VecDeque<VarId> = VecDeque::new();

    for node in graph.nodes() {
        if !node.reaching.is_empty() || node.open {
            queued[node.id.index()] = true;
            work.push_back(node.id);
        }
    }

    while let Some(current) = work.pop_front() {
        queued[current.index()] = false;
        stats.iterations += 1;

        let node = graph.node_mut(current);
        node.visited = true;
        let reaching: Vec<_> = node.reaching.iter().copied().collect();
        let open = node.open;
        let successors: Vec<VarId> = node.edges.iter().copied().collect();

        for successor in successors {
            let target = graph.node_mut(successor);
            let before = target.reaching.len();
            match &target.filter {
                Some(filter) => target
                    .reaching
                    .extend(reaching.iter().copied().filter(|class| filter.contains(class))),
                None => target.reaching.extend(reaching.iter().copied()),
            }
            let mut grew = target.reaching.len() > before;
            if open && !target.open {
                target.open = true;
                grew = true;
            }
            if grew {
                stats.updates += 1;
                trace!("{} -> {}: {} classes", current, successor, target.reaching.len());
                if !queued[successor.index()] {
                    queued[successor.index()] = true;
                    work.push_back(successor);
                }
            }
        }
    }

    stats
}
