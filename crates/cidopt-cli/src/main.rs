use anyhow::Context;
use cidopt_core::config::{CliOverrides, OptimizationLevel, OptimizerConfig};
use cidopt_core::diagnostics::{ConsoleDiagnosticHandler, DiagnosticHandler};
use cidopt_core::{Optimizer, Program, ProgramDescription, ProgramReport};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Default configuration file looked up in the working directory
const CONFIG_FILE_NAME: &str = "cidopt.yaml";

/// cidopt - class hierarchy encoding and devirtualization
#[derive(Parser, Debug, Clone)]
#[command(name = "cidopt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bound program description (.yaml, .yml or .json)
    #[arg(value_name = "PROGRAM", required_unless_present = "init")]
    program: Option<PathBuf>,

    /// Path to cidopt.yaml configuration file
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// Optimization level (0-3); devirtualization starts at 2
    #[arg(short = 'O', long = "opt-level", value_name = "LEVEL", value_parser = parse_level)]
    opt_level: Option<OptimizationLevel>,

    /// Skip devirtualization regardless of the level
    #[arg(long)]
    no_devirtualize: bool,

    /// Persisted cid map (file or directory)
    #[arg(long, value_name = "PATH")]
    cid_cache: Option<PathBuf>,

    /// Rewrite the cid cache after a successful encoding
    #[arg(long)]
    update_cache: bool,

    /// Write the class hierarchy as a dot graph
    #[arg(long, value_name = "FILE")]
    dump_hierarchy: Option<PathBuf>,

    /// Write one dot flow graph per unit into this directory
    #[arg(long, value_name = "DIR")]
    dump_flow_graphs: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    out_file: Option<PathBuf>,

    /// Initialize a new cidopt.yaml in the current directory
    #[arg(long)]
    init: bool,

    /// Print diagnostics without colors
    #[arg(long)]
    no_pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_level(value: &str) -> Result<OptimizationLevel, String> {
    OptimizationLevel::parse(value)
        .ok_or_else(|| format!("invalid optimization level '{}' (expected 0-3)", value))
}

fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for per-decision logs; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.init {
        return init_project();
    }

    let config = load_config(&cli)?;
    let Some(program_path) = cli.program.as_deref() else {
        eprintln!("Error: No program specified. Use --help for usage information.");
        std::process::exit(1);
    };

    let mut program = match load_program(program_path) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Loaded {} classes, {} functions, {} units from {}",
        program.lattice.len(),
        program.functions.len(),
        program.units.len(),
        program_path.display()
    );

    let options = config.optimizer_options;
    let handler = Arc::new(ConsoleDiagnosticHandler::new(options.pretty));
    let optimizer = Optimizer::new(options, handler.clone());
    debug!("Passes: {}", optimizer.pass_names().join(", "));

    let report = match optimizer.compile(&mut program) {
        Ok(report) => report,
        Err(e) => {
            // Encoder and resolver failures were already reported per subject
            if !handler.has_errors() {
                eprintln!("error: {}", e);
            }
            std::process::exit(1);
        }
    };

    emit_report(&report, cli.format, cli.out_file.as_deref())
}

/// Write a default configuration file
fn init_project() -> anyhow::Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);
    if path.exists() {
        anyhow::bail!("{} already exists", CONFIG_FILE_NAME);
    }
    OptimizerConfig::init_file(path).context("Failed to write configuration")?;
    println!("Created {}", CONFIG_FILE_NAME);
    Ok(())
}

/// Load the configuration file (if any) and apply command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<OptimizerConfig> {
    let mut config = if let Some(ref project_path) = cli.project {
        OptimizerConfig::from_file(project_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?
    } else {
        let default_path = PathBuf::from(CONFIG_FILE_NAME);
        if default_path.exists() {
            OptimizerConfig::from_file(&default_path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", CONFIG_FILE_NAME, e))?
        } else {
            OptimizerConfig::default()
        }
    };

    let path_string =
        |path: &Option<PathBuf>| path.as_ref().map(|p| p.to_string_lossy().to_string());
    config.merge_with_cli(CliOverrides {
        optimization_level: cli.opt_level,
        devirtualize: cli.no_devirtualize.then_some(false),
        cid_cache: path_string(&cli.cid_cache),
        update_cache: cli.update_cache.then_some(true),
        dump_hierarchy: path_string(&cli.dump_hierarchy),
        dump_flow_graphs: path_string(&cli.dump_flow_graphs),
        pretty: cli.no_pretty.then_some(false),
    });
    Ok(config)
}

/// Read and bind a program description, choosing the format by extension
fn load_program(path: &Path) -> anyhow::Result<Program> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let description = if is_json {
        ProgramDescription::from_json(&source)
            .with_context(|| format!("Invalid program description {}", path.display()))?
    } else {
        ProgramDescription::from_yaml(&source)
            .with_context(|| format!("Invalid program description {}", path.display()))?
    };
    let program = description
        .bind()
        .with_context(|| format!("Failed to bind {}", path.display()))?;
    Ok(program)
}

fn emit_report(
    report: &ProgramReport,
    format: OutputFormat,
    out_file: Option<&Path>,
) -> anyhow::Result<()> {
    let rendered = match format {
        OutputFormat::Text => report.render_text(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(report)?;
            json.push('\n');
            json
        }
    };

    match out_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
