//! Serializable summary of one optimizer run, as printed by the binary
use super::devirtualization::{CallDecision, KeepReason, UnitReport};
use super::WholeProgramAnalysis;
use crate::bound::Program;
use crate::config::OptimizationLevel;
use crate::lattice::EncodingSummary;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramReport {
    pub optimization_level: OptimizationLevel,
    pub encoding: EncodingSummary,
    pub classes: Vec<ClassReport>,
    pub units: Vec<UnitSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReport {
    pub name: String,
    pub level: u32,
    pub key: u64,
    pub cid: u64,
    pub live: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummary {
    pub name: String,
    pub devirtualized: usize,
    pub kept: usize,
    pub iterations: usize,
    pub updates: usize,
    /// Direct calls written back into the bound bodies
    pub rewritten: usize,
    pub calls: Vec<CallReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    pub site: u32,
    pub function: String,
    pub method: String,
    pub devirtualized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

impl ProgramReport {
    pub fn new(
        program: &Program,
        analysis: &WholeProgramAnalysis,
        optimization_level: OptimizationLevel,
        units: Vec<(UnitReport, usize)>,
    ) -> Self {
        let lattice = &analysis.lattice;
        let classes = lattice
            .iter()
            .filter(|(_, node)| node.is_encoded())
            .map(|(id, node)| ClassReport {
                name: node.name.clone(),
                level: node.level,
                key: node.key,
                cid: node.cid,
                live: analysis.live_classes.contains(&id),
            })
            .collect();

        let units = units
            .into_iter()
            .map(|(report, rewritten)| UnitSummary {
                name: report.unit,
                devirtualized: report.devirtualized,
                kept: report.kept,
                iterations: report.stats.iterations,
                updates: report.stats.updates,
                rewritten,
                calls: report
                    .decisions
                    .iter()
                    .map(|resolution| {
                        let name = |f| program.functions.name(f).to_string();
                        let (target, reason, candidates) = match &resolution.decision {
                            CallDecision::Devirtualize { target } => (Some(name(*target)), None, Vec::new()),
                            CallDecision::KeepVirtual { reason } => match reason {
                                KeepReason::Unreachable => (None, Some("unreachable"), Vec::new()),
                                KeepReason::OpenReceiver => (None, Some("open receiver"), Vec::new()),
                                KeepReason::Polymorphic { targets } => (
                                    None,
                                    Some("polymorphic"),
                                    targets.iter().map(|&t| name(t)).collect(),
                                ),
                            },
                        };
                        CallReport {
                            site: resolution.site.0,
                            function: name(resolution.function),
                            method: resolution.method.clone(),
                            devirtualized: target.is_some(),
                            target,
                            reason,
                            candidates,
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            optimization_level,
            encoding: analysis.encoding,
            classes,
            units,
        }
    }

    pub fn devirtualized(&self) -> usize {
        self.units.iter().map(|u| u.devirtualized).sum()
    }

    pub fn kept(&self) -> usize {
        self.units.iter().map(|u| u.kept).sum()
    }

    /// Human-readable rendering
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "encoded {} classes over {} levels (largest cid {})\n",
            self.encoding.classes, self.encoding.levels, self.encoding.max_cid
        );
        for class in &self.classes {
            out.push_str(&format!(
                "  {:<32} level {:<2} key {:<6} cid {}{}\n",
                class.name,
                class.level,
                class.key,
                class.cid,
                if class.live { "" } else { " (dead)" }
            ));
        }
        for unit in &self.units {
            out.push_str(&format!(
                "unit {}: {} devirtualized, {} kept\n",
                unit.name, unit.devirtualized, unit.kept
            ));
            for call in &unit.calls {
                let outcome = match (&call.target, call.reason) {
                    (Some(target), _) => format!("direct call to {}", target),
                    (None, Some("polymorphic")) => {
                        format!("virtual ({})", call.candidates.join(", "))
                    }
                    (None, reason) => format!("virtual ({})", reason.unwrap_or("kept")),
                };
                out.push_str(&format!(
                    "  site{} in {} .{}: {}\n",
                    call.site, call.function, call.method, outcome
                ));
            }
        }
        out
    }
}
