use crate::errors::CompilationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptimizationLevel {
    #[serde(rename = "O0")]
    O0,
    #[serde(rename = "O1")]
    O1,
    #[serde(rename = "O2")]
    O2,
    #[serde(rename = "O3")]
    O3,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::O2
    }
}

impl OptimizationLevel {
    /// Lowest level at which virtual calls are rewritten
    pub const DEVIRTUALIZE: OptimizationLevel = OptimizationLevel::O2;

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" | "O0" | "o0" => Some(OptimizationLevel::O0),
            "1" | "O1" | "o1" => Some(OptimizationLevel::O1),
            "2" | "O2" | "o2" => Some(OptimizationLevel::O2),
            "3" | "O3" | "o3" => Some(OptimizationLevel::O3),
            _ => None,
        }
    }
}

/// Options of the encoder and devirtualization passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerOptions {
    /// Optimization level (default: O2)
    #[serde(default)]
    pub optimization_level: OptimizationLevel,

    /// Run devirtualization at all (default: true)
    #[serde(default = "default_true")]
    pub devirtualize: bool,

    /// Persisted cid map used to keep encodings stable across builds
    #[serde(default)]
    pub cid_cache: Option<String>,

    /// Rewrite the cid cache after a successful encoding (default: false)
    #[serde(default)]
    pub update_cache: bool,

    /// Write the class hierarchy as a graph description to this file
    #[serde(default)]
    pub dump_hierarchy: Option<String>,

    /// Write one flow graph per unit into this directory
    #[serde(default)]
    pub dump_flow_graphs: Option<String>,

    /// Pretty-print diagnostics (default: true)
    #[serde(default = "default_true")]
    pub pretty: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::default(),
            devirtualize: true,
            cid_cache: None,
            update_cache: false,
            dump_hierarchy: None,
            dump_flow_graphs: None,
            pretty: true,
        }
    }
}

impl OptimizerOptions {
    pub fn devirtualization_enabled(&self) -> bool {
        self.devirtualize && self.optimization_level >= OptimizationLevel::DEVIRTUALIZE
    }
}

/// Main configuration, as stored in `cidopt.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    #[serde(default)]
    pub optimizer_options: OptimizerOptions,
}

/// Values given on the command line; `None` keeps the file's value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub optimization_level: Option<OptimizationLevel>,
    pub devirtualize: Option<bool>,
    pub cid_cache: Option<String>,
    pub update_cache: Option<bool>,
    pub dump_hierarchy: Option<String>,
    pub dump_flow_graphs: Option<String>,
    pub pretty: Option<bool>,
}

impl OptimizerConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension)
    pub fn from_file(path: &Path) -> Result<Self, CompilationError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            serde_json::from_str(&content).map_err(|e| CompilationError::ConfigError(e.to_string()))
        } else {
            serde_yaml::from_str(&content).map_err(|e| CompilationError::ConfigError(e.to_string()))
        }
    }

    /// Create a default configuration and write it to a file
    pub fn init_file(path: &Path) -> Result<(), CompilationError> {
        let config = OptimizerConfig::default();
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| CompilationError::ConfigError(e.to_string()))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Merge CLI flags into the file configuration
    pub fn merge_with_cli(&mut self, overrides: CliOverrides) {
        let options = &mut self.optimizer_options;
        if let Some(level) = overrides.optimization_level {
            options.optimization_level = level;
        }
        if let Some(devirtualize) = overrides.devirtualize {
            options.devirtualize = devirtualize;
        }
        if overrides.cid_cache.is_some() {
            options.cid_cache = overrides.cid_cache;
        }
        if let Some(update) = overrides.update_cache {
            options.update_cache = update;
        }
        if overrides.dump_hierarchy.is_some() {
            options.dump_hierarchy = overrides.dump_hierarchy;
        }
        if overrides.dump_flow_graphs.is_some() {
            options.dump_flow_graphs = overrides.dump_flow_graphs;
        }
        if let Some(pretty) = overrides.pretty {
            options.pretty = pretty;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert!(config.optimizer_options.devirtualize);
        assert_eq!(
            config.optimizer_options.optimization_level,
            OptimizationLevel::O2
        );
        assert!(config.optimizer_options.devirtualization_enabled());
    }

    #[test]
    fn test_serialize_config() {
        let config = OptimizerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("optimizerOptions"));
        assert!(json.contains("\"optimizationLevel\":\"O2\""));
    }

    #[test]
    fn test_deserialize_yaml_config() {
        let yaml = "optimizerOptions:\n  optimizationLevel: O1\n  cidCache: build/cids.bin\n";
        let config: OptimizerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.optimizer_options.optimization_level,
            OptimizationLevel::O1
        );
        assert_eq!(
            config.optimizer_options.cid_cache.as_deref(),
            Some("build/cids.bin")
        );
        assert!(!config.optimizer_options.devirtualization_enabled());
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = OptimizerConfig::default();
        config.merge_with_cli(CliOverrides {
            devirtualize: Some(false),
            dump_hierarchy: Some("h.dot".to_string()),
            ..CliOverrides::default()
        });
        assert!(!config.optimizer_options.devirtualize);
        assert_eq!(
            config.optimizer_options.dump_hierarchy.as_deref(),
            Some("h.dot")
        );
        assert!(config.optimizer_options.pretty);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(OptimizationLevel::parse("3"), Some(OptimizationLevel::O3));
        assert_eq!(OptimizationLevel::parse("O0"), Some(OptimizationLevel::O0));
        assert_eq!(OptimizationLevel::parse("fast"), None);
    }
}
