//! Optimizer driver
//!
//! Runs the class hierarchy encoder once over the whole program, then the
//! devirtualization pipeline on every compiled unit. Units share nothing
//! mutable, so they are processed on rayon's pool.

use crate::bound::Program;
use crate::cache::{CidCache, CID_CACHE_FILE_NAME};
use crate::config::{OptimizationLevel, OptimizerOptions};
use crate::diagnostics::{DiagnosticHandler, Subject};
use crate::dot::{flow_graph_to_dot, hierarchy_to_dot};
use crate::errors::{CompilationError, EncodeError, ResolveError};

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod devirtualization;
pub use devirtualization::{
    CallDecision, CallSiteResolver, DevirtualizationPass, KeepReason, PropagationStats,
    Resolution, TypePropagationGraph, UnitReport,
};

mod method_to_function_conversion;
pub use method_to_function_conversion::MethodToFunctionConversionPass;

mod report;
pub use report::{CallReport, ClassReport, ProgramReport, UnitSummary};

mod whole_program_analysis;
pub use whole_program_analysis::WholeProgramAnalysis;

pub struct Optimizer {
    options: OptimizerOptions,
    handler: Arc<dyn DiagnosticHandler>,
}

impl Optimizer {
    pub fn new(options: OptimizerOptions, handler: Arc<dyn DiagnosticHandler>) -> Self {
        Self { options, handler }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    /// Names of the passes the configured level runs, in order
    pub fn pass_names(&self) -> Vec<&'static str> {
        let mut names = vec!["hierarchy-encoding"];
        if self.options.devirtualization_enabled() {
            names.push("devirtualization");
            if self.options.optimization_level >= OptimizationLevel::O3 {
                names.push("method-to-function-conversion");
            }
        }
        names
    }

    /// Encode, devirtualize, and write the configured cache and dumps
    pub fn compile(&self, program: &mut Program) -> Result<ProgramReport, CompilationError> {
        let prior = self.load_prior();
        let analysis = self.analyze(program, prior.as_ref())?;

        if self.options.update_cache {
            if let Some(path) = self.cache_path() {
                CidCache::from_lattice(&analysis.lattice).save(&path)?;
            }
        }
        if let Some(path) = &self.options.dump_hierarchy {
            write_dump(Path::new(path), &hierarchy_to_dot(&analysis.lattice, &analysis.live_classes))?;
        }

        self.run(program, &analysis)
    }

    /// Where the persisted Cid map lives; a directory gets the default file name
    pub fn cache_path(&self) -> Option<PathBuf> {
        let path = PathBuf::from(self.options.cid_cache.as_ref()?);
        if path.is_dir() {
            Some(path.join(CID_CACHE_FILE_NAME))
        } else {
            Some(path)
        }
    }

    /// Load the prior encoding. An unreadable cache only costs stability
    /// across builds, so it is reported and ignored.
    pub fn load_prior(&self) -> Option<CidCache> {
        let path = self.cache_path()?;
        if !path.exists() {
            debug!("No cid cache at {}", path.display());
            return None;
        }
        match CidCache::load(&path) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Ignoring cid cache {}: {}", path.display(), e);
                self.handler
                    .warning(Subject::Program, &format!("ignoring cid cache: {}", e));
                None
            }
        }
    }

    /// Encode the class hierarchy, reporting failures to the handler
    pub fn analyze(
        &self,
        program: &mut Program,
        prior: Option<&CidCache>,
    ) -> Result<WholeProgramAnalysis, CompilationError> {
        WholeProgramAnalysis::build(program, prior).map_err(|e| {
            match &e {
                EncodeError::StabilityConflict { conflicts } => {
                    for conflict in conflicts {
                        self.handler.error(
                            Subject::Class(conflict.class.clone()),
                            &format!(
                                "persisted cid {} cannot be reproduced (hierarchy now encodes {})",
                                conflict.persisted, conflict.computed
                            ),
                        );
                    }
                }
                e if e.is_internal() => self
                    .handler
                    .error(Subject::Program, &format!("internal compiler error: {}", e)),
                e => self.handler.error(Subject::Program, &e.to_string()),
            }
            CompilationError::from(e)
        })
    }

    /// Devirtualize every unit against a finished analysis
    pub fn run(
        &self,
        program: &mut Program,
        analysis: &WholeProgramAnalysis,
    ) -> Result<ProgramReport, CompilationError> {
        let level = self.options.optimization_level;
        if !self.options.devirtualization_enabled() {
            info!("Devirtualization disabled at {:?}", level);
            return Ok(ProgramReport::new(program, analysis, level, Vec::new()));
        }

        let rewrite = level >= OptimizationLevel::O3;
        let keep_graphs = self.options.dump_flow_graphs.is_some();
        let lattice = &analysis.lattice;
        let functions = &program.functions;

        let results: Vec<_> = program
            .units
            .par_iter_mut()
            .map(|unit| -> Result<_, (String, ResolveError)> {
                let pass = DevirtualizationPass::new(lattice, functions);
                let (report, graph) = pass
                    .run_with_graph(unit)
                    .map_err(|e| (unit.name.clone(), e))?;
                let rewritten = if rewrite {
                    MethodToFunctionConversionPass::new(&report.decisions).run(unit)
                } else {
                    0
                };
                Ok((report, rewritten, keep_graphs.then_some(graph)))
            })
            .collect();

        let mut reports = Vec::with_capacity(results.len());
        for result in results {
            let (report, rewritten, graph) = result.map_err(|(unit, e)| {
                let site = match &e {
                    ResolveError::UnresolvedMethod { site, .. } => *site,
                };
                self.handler.error(
                    Subject::CallSite { unit, site },
                    &format!("internal compiler error: {}", e),
                );
                CompilationError::from(e)
            })?;
            if let (Some(dir), Some(graph)) = (&self.options.dump_flow_graphs, graph) {
                let path = Path::new(dir).join(format!("{}.dot", report.unit));
                write_dump(&path, &flow_graph_to_dot(&report.unit, &graph, lattice))?;
            }
            reports.push((report, rewritten));
        }

        let report = ProgramReport::new(program, analysis, level, reports);
        info!(
            "Optimized {} units: {} call sites devirtualized, {} kept virtual",
            report.units.len(),
            report.devirtualized(),
            report.kept()
        );
        Ok(report)
    }
}

fn write_dump(path: &Path, contents: &str) -> Result<(), CompilationError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)?;
    debug!("Wrote {}", path.display());
    Ok(())
}
