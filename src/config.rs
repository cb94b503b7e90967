//! Configuration system for the linter
//!
//! Reads configuration from:
//! - `.proxylintrc.yaml` / `.proxylintrc.json` / `proxylint.yaml` (project-level)
//! - the same names in the home directory (user-level)

use crate::diagnostic::Severity;
use crate::rule::{Rule, RuleCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File names searched for, in order
pub const CONFIG_FILE_NAMES: [&str; 6] = [
    ".proxylintrc.yaml",
    ".proxylintrc.yml",
    ".proxylintrc.json",
    "proxylint.yaml",
    "proxylint.yml",
    "proxylint.json",
];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parse and check documents in parallel
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    pub color: ColorMode,

    /// Show help text and notes under each diagnostic
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Compact,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "compact" => Ok(OutputFormat::Compact),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// File handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Include patterns
    pub include: Vec<String>,

    /// Exclude patterns
    pub exclude: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.xml".to_string()],
            exclude: vec![
                "**/target/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
            ],
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Enabled rules (empty = all)
    pub enabled: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,

    /// Per-file rule ignores (glob pattern -> rule IDs, or "all")
    pub per_file: HashMap<String, Vec<String>>,
}

/// Policy naming settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Extra accepted prefixes per policy type (e.g. `AssignMessage: [msg]`)
    pub prefixes: HashMap<String, Vec<String>>,
}

/// Thresholds for the endpoint-count rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_proxy_endpoints: usize,
    pub max_target_endpoints: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_proxy_endpoints: 2,
            max_target_endpoints: 5,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration files or presets this one builds on
    pub extends: Vec<String>,

    pub engine: EngineConfig,

    pub output: OutputConfig,

    pub files: FilesConfig,

    pub rules: RulesConfig,

    pub naming: NamingConfig,

    pub limits: LimitsConfig,

    /// Rule categories to enable (empty = all)
    pub categories: Vec<String>,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a preset configuration by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "recommended" => Some(Self::default()),
            "minimal" => Some(Self {
                categories: vec!["correctness".to_string()],
                ..Self::default()
            }),
            _ => None,
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    /// Load with recursion depth limit (to prevent infinite loops)
    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        if !config.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base_config = Self::default();

            for extend in &config.extends.clone() {
                let extended = match Self::preset(extend) {
                    Some(preset) => preset,
                    None => {
                        let extend_path = if Path::new(extend).is_absolute() {
                            PathBuf::from(extend)
                        } else {
                            base_dir.join(extend)
                        };
                        Self::load_with_depth(&extend_path, depth + 1)?
                    }
                };
                base_config.merge(extended);
            }

            base_config.merge(config);
            config = base_config;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in &self.categories {
            category
                .parse::<RuleCategory>()
                .map_err(ConfigError::Invalid)?;
        }
        for pattern in self.files.include.iter().chain(&self.files.exclude) {
            globset::Glob::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("bad file pattern '{}': {}", pattern, e)))?;
        }
        for pattern in self.rules.per_file.keys() {
            globset::Glob::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("bad per-file pattern '{}': {}", pattern, e)))?;
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        self.engine.parallel = other.engine.parallel;

        if other.output.format != OutputFormat::Text {
            self.output.format = other.output.format;
        }
        if other.output.verbose {
            self.output.verbose = true;
        }
        if other.output.color != ColorMode::Auto {
            self.output.color = other.output.color;
        }

        for pattern in other.files.include {
            if !self.files.include.contains(&pattern) {
                self.files.include.push(pattern);
            }
        }
        for pattern in other.files.exclude {
            if !self.files.exclude.contains(&pattern) {
                self.files.exclude.push(pattern);
            }
        }

        self.rules.disabled.extend(other.rules.disabled);
        if !other.rules.enabled.is_empty() {
            self.rules.enabled = other.rules.enabled;
        }
        self.rules.severity.extend(other.rules.severity);
        for (pattern, rules) in other.rules.per_file {
            self.rules.per_file.entry(pattern).or_default().extend(rules);
        }

        for (policy, prefixes) in other.naming.prefixes {
            self.naming.prefixes.entry(policy).or_default().extend(prefixes);
        }

        let default_limits = LimitsConfig::default();
        if other.limits.max_proxy_endpoints != default_limits.max_proxy_endpoints {
            self.limits.max_proxy_endpoints = other.limits.max_proxy_endpoints;
        }
        if other.limits.max_target_endpoints != default_limits.max_target_endpoints {
            self.limits.max_target_endpoints = other.limits.max_target_endpoints;
        }

        if !other.categories.is_empty() {
            self.categories = other.categories;
        }
    }

    /// First configuration file found in `dir`
    pub fn find_in(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::find_in(Path::new(".")) {
            log::debug!("Using configuration {}", path.display());
            return Self::load(&path);
        }

        if let Some(path) = dirs::home_dir().and_then(|home| Self::find_in(&home)) {
            log::debug!("Using configuration {}", path.display());
            return Self::load(&path);
        }

        Ok(Self::default())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        format: Option<OutputFormat>,
        verbose: Option<bool>,
        jobs: Option<usize>,
        disabled_rules: Option<Vec<String>>,
        enabled_rules: Option<Vec<String>>,
    ) {
        if let Some(f) = format {
            self.output.format = f;
        }
        if let Some(v) = verbose {
            self.output.verbose = v;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
            if j == 1 {
                self.engine.parallel = false;
            }
        }
        if let Some(disabled) = disabled_rules {
            self.rules.disabled.extend(disabled);
        }
        if let Some(enabled) = enabled_rules {
            self.rules.enabled = enabled;
        }
    }

    /// Check if a rule is enabled by id
    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        if self.rules.disabled.iter().any(|r| r == rule_id) {
            return false;
        }

        if !self.rules.enabled.is_empty() {
            return self.rules.enabled.iter().any(|r| r == rule_id);
        }

        true
    }

    /// Whether `rule` should run: its own default, the enable/disable lists
    /// and the category filter. Listing a rule in `enabled` turns on a rule
    /// that is off by default.
    pub fn should_run(&self, rule: &Rule) -> bool {
        if !self.is_rule_enabled(&rule.id) {
            return false;
        }
        if !rule.enabled && !self.rules.enabled.iter().any(|r| r == &rule.id) {
            return false;
        }
        if !self.categories.is_empty() {
            return self
                .categories
                .iter()
                .filter_map(|c| c.parse::<RuleCategory>().ok())
                .any(|c| c == rule.category);
        }
        true
    }

    /// Get severity override for a rule
    pub fn get_severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.rules.severity.get(rule_id).copied()
    }

    /// Check if a rule should be ignored for a file
    pub fn should_ignore_rule_for_file(&self, rule_id: &str, file_path: &Path) -> bool {
        let file_str = file_path.to_string_lossy();

        for (pattern, rules) in &self.rules.per_file {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(file_str.as_ref())
                    && rules.iter().any(|r| r == "all" || r == rule_id)
                {
                    return true;
                }
            }
        }

        false
    }
}
