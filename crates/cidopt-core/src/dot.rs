//! Graphviz dumps of the class hierarchy and of per-unit flow graphs.
//!
//! Developer aids only; nothing reads them back.

use crate::lattice::{ClassId, ClassLattice};
use crate::optimizer::devirtualization::TypePropagationGraph;
use rustc_hash::FxHashSet;

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Encoded classes with their key and Cid; classes never instantiated are
/// drawn dashed. Edges point from a class to its base.
pub fn hierarchy_to_dot(lattice: &ClassLattice, live: &FxHashSet<ClassId>) -> String {
    let mut out = String::from("digraph hierarchy {\n    rankdir=BT;\n    node [shape=box];\n");

    for (id, node) in lattice.iter().filter(|(_, node)| node.is_encoded()) {
        let style = if live.contains(&id) { "" } else { ", style=dashed" };
        out.push_str(&format!(
            "    c{} [label=\"{}\\nkey={} cid={}\"{}];\n",
            id.as_u32(),
            escape(&node.name),
            node.key,
            node.cid,
            style
        ));
    }
    for (id, node) in lattice.iter().filter(|(_, node)| node.is_encoded()) {
        if let Some(base) = node.base {
            out.push_str(&format!("    c{} -> c{};\n", id.as_u32(), base.as_u32()));
        }
    }

    out.push_str("}\n");
    out
}

/// Nodes show their origin and sorted reaching set; visited nodes are filled
/// and open nodes drawn in red
pub fn flow_graph_to_dot(name: &str, graph: &TypePropagationGraph, lattice: &ClassLattice) -> String {
    let mut out = format!("digraph \"{}\" {{\n    node [shape=ellipse];\n", escape(name));

    for node in graph.nodes() {
        let mut classes: Vec<&str> = node.reaching.iter().map(|&c| lattice.name(c)).collect();
        classes.sort_unstable();

        let mut attrs = String::new();
        if node.visited {
            attrs.push_str(", style=filled, fillcolor=lightgrey");
        }
        if node.open {
            attrs.push_str(", color=red");
        }
        out.push_str(&format!(
            "    {} [label=\"{}\\n{{{}}}{}\"{}];\n",
            node.id,
            node.origin,
            escape(&classes.join(", ")),
            if node.open { " +open" } else { "" },
            attrs
        ));
    }

    for node in graph.nodes() {
        let mut successors: Vec<_> = node.edges.iter().copied().collect();
        successors.sort();
        for successor in successors {
            out.push_str(&format!("    {} -> {};\n", node.id, successor));
        }
    }

    for call_site in graph.call_sites() {
        out.push_str(&format!(
            "    {} [shape=box, label=\"{}.{}\"];\n    {} -> {} [style=dotted];\n",
            call_site.site,
            call_site.site,
            escape(&call_site.method.name),
            call_site.receiver,
            call_site.site
        ));
    }

    out.push_str("}\n");
    out
}
