//! Test compilation helpers
//!
//! Bind a YAML program description and push it through the optimizer with a
//! mock diagnostic handler attached.

use crate::mocks::MockDiagnosticHandler;
use cidopt_core::config::{OptimizationLevel, OptimizerOptions};
use cidopt_core::{Optimizer, Program, ProgramDescription, ProgramReport};
use std::sync::Arc;

/// Bind a YAML program description
///
/// # Panics
/// When the description does not parse or bind
pub fn bind(yaml: &str) -> Program {
    ProgramDescription::from_yaml(yaml)
        .unwrap_or_else(|e| panic!("invalid program description: {}", e))
        .bind()
        .unwrap_or_else(|e| panic!("program does not bind: {}", e))
}

/// Optimize a YAML program at the default level
pub fn optimize(yaml: &str) -> Result<(Program, ProgramReport), String> {
    optimize_with_level(yaml, OptimizationLevel::default())
}

/// Optimize a YAML program at `level`, returning the (possibly rewritten)
/// program and the report
pub fn optimize_with_level(
    yaml: &str,
    level: OptimizationLevel,
) -> Result<(Program, ProgramReport), String> {
    let handler = MockDiagnosticHandler::new();
    optimize_with_handler(yaml, level, handler)
}

pub fn optimize_with_handler(
    yaml: &str,
    level: OptimizationLevel,
    handler: Arc<MockDiagnosticHandler>,
) -> Result<(Program, ProgramReport), String> {
    let mut program = ProgramDescription::from_yaml(yaml)
        .map_err(|e| format!("Parsing failed: {}", e))?
        .bind()
        .map_err(|e| format!("Binding failed: {}", e))?;

    let options = OptimizerOptions {
        optimization_level: level,
        ..OptimizerOptions::default()
    };
    let optimizer = Optimizer::new(options, handler);
    let report = optimizer
        .compile(&mut program)
        .map_err(|e| e.to_string())?;
    Ok((program, report))
}
