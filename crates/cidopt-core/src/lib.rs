pub mod bound;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod dot;
pub mod errors;
pub mod lattice;
pub mod optimizer;

pub use bound::{Program, ProgramDescription};
pub use cache::CidCache;
pub use config::{CliOverrides, OptimizationLevel, OptimizerConfig, OptimizerOptions};
pub use diagnostics::{Diagnostic, DiagnosticHandler, DiagnosticLevel, Subject};
pub use errors::{BindError, CompilationError, EncodeError, ResolveError};
pub use lattice::{ClassId, ClassKind, ClassLattice, HierarchyEncoder, PrimeSupplier, TrialDivision};
pub use optimizer::{Optimizer, ProgramReport, WholeProgramAnalysis};
