//! Lint engine
//!
//! Ties the pieces together for a run over files on disk: discovery, reading,
//! bundle construction, the check runner and result aggregation.

use crate::bundle::Bundle;
use crate::check::CheckRegistry;
use crate::checks;
use crate::config::Config;
use crate::diagnostic::{Diagnostic, Location, Severity};
use crate::rule::Rule;
use crate::runner::Runner;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rule id of diagnostics for files that could not be read
pub const FILE_READ_ERROR_RULE: &str = "file-read-error";

/// Errors raised before any file is linted
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid file filter: {0}")]
    Filter(#[from] globset::Error),
}

/// Result of linting operation
#[derive(Debug, Default)]
pub struct LintResult {
    /// All diagnostics, file by file in input order
    pub diagnostics: Vec<Diagnostic>,

    /// Files processed
    pub files_processed: usize,

    /// Files with errors
    pub files_with_errors: usize,

    /// Files with warnings
    pub files_with_warnings: usize,

    /// Total errors
    pub error_count: usize,

    /// Total warnings
    pub warning_count: usize,

    /// Total info messages
    pub info_count: usize,

    /// Processing duration
    pub duration: Duration,
}

impl LintResult {
    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    /// Check if result is clean (no errors or warnings)
    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// Get exit code (0 = success, 1 = warnings, 2 = errors)
    pub fn exit_code(&self) -> i32 {
        if self.error_count > 0 {
            2
        } else if self.warning_count > 0 {
            1
        } else {
            0
        }
    }

    /// Diagnostics reported for `path`
    pub fn for_file<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| d.location.file == path)
    }

    /// Append the diagnostics of one file and update the counts
    fn add_file(&mut self, diagnostics: Vec<Diagnostic>) {
        self.files_processed += 1;

        let mut errors = 0;
        let mut warnings = 0;
        for diag in &diagnostics {
            match diag.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
                Severity::Info => self.info_count += 1,
            }
        }

        if errors > 0 {
            self.files_with_errors += 1;
        }
        if warnings > 0 {
            self.files_with_warnings += 1;
        }
        self.error_count += errors;
        self.warning_count += warnings;
        self.diagnostics.extend(diagnostics);
    }
}

/// A file as handed to the bundle, or the reason it could not be
enum Loaded {
    Source(PathBuf, String),
    Unreadable(Diagnostic),
}

/// Linter engine
pub struct Engine {
    config: Config,
    registry: CheckRegistry,
    runner: Runner,
}

impl Engine {
    /// Create an engine running the built-in checks selected by `config`
    pub fn new(config: Config) -> Self {
        let mut registry = checks::builtin(&config);
        registry.retain(|rule| config.should_run(rule));
        debug!("{} rules enabled", registry.len());

        let mut runner = Runner::new().with_severity_overrides(config.rules.severity.clone());
        if config.engine.parallel {
            runner = runner.with_parallel(config.engine.jobs);
        }

        Self {
            config,
            registry,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rules that will run, in registration order
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.registry.rules()
    }

    /// Expand files, directories and glob patterns into the files to lint.
    ///
    /// Files found under a directory or through a pattern must match an
    /// include filter; files named explicitly are always kept. Exclude
    /// filters apply to both. The result is sorted and free of duplicates.
    pub fn discover(&self, inputs: &[String]) -> Result<Vec<PathBuf>, EngineError> {
        let include = build_set(&self.config.files.include)?;
        let exclude = build_set(&self.config.files.exclude)?;

        let mut files = Vec::new();
        for input in inputs {
            let path = Path::new(input);
            if path.is_file() {
                if !exclude.is_match(path) {
                    files.push(path.to_path_buf());
                }
                continue;
            }

            let pattern = if path.is_dir() {
                let dir = glob::Pattern::escape(&path.to_string_lossy());
                format!("{}/**/*", dir.trim_end_matches('/'))
            } else {
                input.clone()
            };

            let entries = glob::glob(&pattern).map_err(|source| EngineError::Pattern {
                pattern: input.clone(),
                source,
            })?;

            let before = files.len();
            for entry in entries {
                match entry {
                    Ok(found) => {
                        if found.is_file() && include.is_match(&found) && !exclude.is_match(&found) {
                            files.push(found);
                        }
                    }
                    Err(e) => warn!("Skipping {}: {}", e.path().display(), e.error()),
                }
            }
            if files.len() == before {
                warn!("No files match '{}'", input);
            }
        }

        files.sort();
        files.dedup();
        info!("Discovered {} files", files.len());
        Ok(files)
    }

    /// Lint files on disk as one bundle
    pub fn lint(&self, files: &[PathBuf]) -> LintResult {
        let start = Instant::now();

        let loaded = files
            .iter()
            .map(|path| match std::fs::read_to_string(path) {
                Ok(content) => Loaded::Source(path.clone(), content),
                Err(e) => Loaded::Unreadable(Diagnostic::parse_failure(
                    FILE_READ_ERROR_RULE,
                    &format!("Failed to read file: {}", e),
                    Location::new(path.clone(), 0, 0),
                )),
            })
            .collect();

        self.lint_loaded(loaded, start)
    }

    /// Lint in-memory sources as one bundle
    pub fn lint_sources(&self, sources: Vec<(PathBuf, String)>) -> LintResult {
        let start = Instant::now();
        let loaded = sources
            .into_iter()
            .map(|(path, content)| Loaded::Source(path, content))
            .collect();
        self.lint_loaded(loaded, start)
    }

    fn lint_loaded(&self, loaded: Vec<Loaded>, start: Instant) -> LintResult {
        // `None` marks the position of the next bundle document
        let mut order: Vec<Option<Diagnostic>> = Vec::with_capacity(loaded.len());
        let mut sources = Vec::new();
        for item in loaded {
            match item {
                Loaded::Source(path, content) => {
                    order.push(None);
                    sources.push((path, content));
                }
                Loaded::Unreadable(diag) => order.push(Some(diag)),
            }
        }

        // Parsing shares the runner's pool
        let bundle = match self.runner.pool() {
            Some(pool) => Bundle::from_sources_parallel(sources, pool),
            None => Bundle::from_sources(sources),
        };
        if bundle.failed_count() > 0 {
            debug!("{} of {} documents failed to parse", bundle.failed_count(), bundle.len());
        }

        let report = self.runner.run(&self.registry, &bundle);
        let mut documents = report.documents.into_iter();

        let mut result = LintResult::default();
        for slot in order {
            let diagnostics = match slot {
                Some(diag) => vec![diag],
                None => match documents.next() {
                    Some(document) => document.diagnostics,
                    None => continue,
                },
            };
            let diagnostics = diagnostics
                .into_iter()
                .filter(|d| {
                    !self
                        .config
                        .should_ignore_rule_for_file(&d.rule_id, &d.location.file)
                })
                .collect();
            result.add_file(diagnostics);
        }

        result.duration = start.elapsed();
        result
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet, EngineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;
    use std::fs;
    use tempfile::TempDir;

    const UNGUARDED_PROXY: &str = r#"<ProxyEndpoint name="default">
    <PreFlow>
        <Request>
            <Step>
                <Name>EV-Body</Name>
            </Step>
        </Request>
    </PreFlow>
</ProxyEndpoint>"#;

    const POLICY: &str = r#"<ExtractVariables name="EV-Body">
    <JSONPayload>
        <Variable name="id"><JSONPath>$.id</JSONPath></Variable>
    </JSONPayload>
</ExtractVariables>"#;

    fn sequential() -> Config {
        let mut config = Config::default();
        config.engine.parallel = false;
        config
    }

    #[test]
    fn test_lint_result_exit_code() {
        let mut result = LintResult::default();
        assert_eq!(result.exit_code(), 0);

        result.warning_count = 1;
        assert_eq!(result.exit_code(), 1);

        result.error_count = 1;
        assert_eq!(result.exit_code(), 2);
    }

    #[test]
    fn test_lint_result_is_clean() {
        let mut result = LintResult::default();
        assert!(result.is_clean());

        result.info_count = 1;
        assert!(result.is_clean());

        result.warning_count = 1;
        assert!(!result.is_clean());
    }

    #[test]
    fn test_lint_sources_counts() {
        let engine = Engine::new(sequential());
        let result = engine.lint_sources(vec![
            (PathBuf::from("proxies/default.xml"), UNGUARDED_PROXY.to_string()),
            (PathBuf::from("policies/EV-Body.xml"), POLICY.to_string()),
            (PathBuf::from("policies/bad.xml"), r#"<AssignMessage name="x"/>"#.to_string()),
        ]);

        assert_eq!(result.files_processed, 3);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.warning_count, 1);
        assert_eq!(result.files_with_errors, 1);
        assert_eq!(result.files_with_warnings, 1);
        assert_eq!(result.exit_code(), 2);

        let proxy: Vec<_> = result.for_file(Path::new("proxies/default.xml")).collect();
        assert_eq!(proxy.len(), 1);
        assert_eq!(proxy[0].location.line, 4);
    }

    #[test]
    fn test_disabled_rule_does_not_run() {
        let mut config = sequential();
        config.rules.disabled.push("policy-name-convention".to_string());
        let engine = Engine::new(config);
        assert!(engine.rules().all(|r| r.id != "policy-name-convention"));

        let result = engine.lint_sources(vec![(
            PathBuf::from("bad.xml"),
            r#"<AssignMessage name="x"/>"#.to_string(),
        )]);
        assert!(result.is_clean());
    }

    #[test]
    fn test_severity_override() {
        let mut config = sequential();
        config
            .rules
            .severity
            .insert("policy-name-convention".to_string(), Severity::Error);
        let result = Engine::new(config).lint_sources(vec![(
            PathBuf::from("bad.xml"),
            r#"<AssignMessage name="x"/>"#.to_string(),
        )]);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.warning_count, 0);
    }

    #[test]
    fn test_per_file_ignore() {
        let mut config = sequential();
        config
            .rules
            .per_file
            .insert("legacy/**".to_string(), vec!["all".to_string()]);
        let result = Engine::new(config).lint_sources(vec![
            (PathBuf::from("legacy/a.xml"), r#"<AssignMessage name="x"/>"#.to_string()),
            (PathBuf::from("current/b.xml"), r#"<AssignMessage name="x"/>"#.to_string()),
        ]);
        assert_eq!(result.files_processed, 2);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].location.file, PathBuf::from("current/b.xml"));
    }

    #[test]
    fn test_unreadable_file_keeps_position() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.xml");
        let missing = dir.path().join("b.xml");
        let last = dir.path().join("c.xml");
        fs::write(&first, r#"<AssignMessage name="x"/>"#).unwrap();
        fs::write(&last, r#"<AssignMessage name="y"/>"#).unwrap();

        let result = Engine::new(sequential()).lint(&[first.clone(), missing.clone(), last.clone()]);
        assert_eq!(result.files_processed, 3);

        let files: Vec<_> = result.diagnostics.iter().map(|d| d.location.file.clone()).collect();
        assert_eq!(files, vec![first, missing.clone(), last]);

        let read_error = &result.diagnostics[1];
        assert_eq!(read_error.rule_id, FILE_READ_ERROR_RULE);
        assert_eq!(read_error.kind, DiagnosticKind::Parse);
        assert_eq!(read_error.location, Location::new(missing, 0, 0));
    }

    #[test]
    fn test_discover_directory_filters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("apiproxy/policies")).unwrap();
        fs::create_dir_all(root.join("apiproxy/resources")).unwrap();
        fs::create_dir_all(root.join("target/stale")).unwrap();
        fs::write(root.join("apiproxy/proxy.xml"), "<APIProxy/>").unwrap();
        fs::write(root.join("apiproxy/policies/AM-x.xml"), "<AssignMessage/>").unwrap();
        fs::write(root.join("apiproxy/resources/script.js"), "var a;").unwrap();
        fs::write(root.join("target/stale/old.xml"), "<APIProxy/>").unwrap();

        let engine = Engine::new(Config::default());
        let found = engine
            .discover(&[root.to_string_lossy().to_string()])
            .unwrap();
        assert_eq!(
            found,
            vec![
                root.join("apiproxy/policies/AM-x.xml"),
                root.join("apiproxy/proxy.xml"),
            ]
        );
    }

    #[test]
    fn test_discover_explicit_file_and_dedup() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bundle.txt");
        fs::write(&file, "<APIProxy/>").unwrap();
        let name = file.to_string_lossy().to_string();

        let engine = Engine::new(Config::default());
        let found = engine.discover(&[name.clone(), name]).unwrap();
        assert_eq!(found, vec![file]);
    }

    #[test]
    fn test_discover_glob_pattern() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.xml"), "<A/>").unwrap();
        fs::write(dir.path().join("b.xml"), "<B/>").unwrap();
        fs::write(dir.path().join("c.json"), "{}").unwrap();

        let pattern = format!(
            "{}/*.xml",
            glob::Pattern::escape(&dir.path().to_string_lossy())
        );
        let found = Engine::new(Config::default()).discover(&[pattern]).unwrap();
        assert_eq!(found, vec![dir.path().join("a.xml"), dir.path().join("b.xml")]);
    }

    #[test]
    fn test_discover_invalid_pattern() {
        let err = Engine::new(Config::default())
            .discover(&["[".to_string()])
            .unwrap_err();
        assert!(matches!(err, EngineError::Pattern { .. }));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sources = vec![
            (PathBuf::from("a.xml"), UNGUARDED_PROXY.to_string()),
            (PathBuf::from("b.xml"), POLICY.to_string()),
            (PathBuf::from("c.xml"), "<broken".to_string()),
            (PathBuf::from("d.xml"), r#"<Quota name="limit"/>"#.to_string()),
        ];

        let mut parallel = Config::default();
        parallel.engine.jobs = 3;

        let seq = Engine::new(sequential()).lint_sources(sources.clone());
        let par = Engine::new(parallel).lint_sources(sources);
        assert_eq!(seq.diagnostics, par.diagnostics);
        assert_eq!(seq.error_count, par.error_count);
    }

    #[test]
    fn test_engine_owns_one_pool() {
        let mut parallel = Config::default();
        parallel.engine.jobs = 2;
        let engine = Engine::new(parallel);
        let pool = engine.runner.pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);

        let sources = vec![
            (PathBuf::from("a.xml"), UNGUARDED_PROXY.to_string()),
            (PathBuf::from("b.xml"), POLICY.to_string()),
        ];
        let first = engine.lint_sources(sources.clone());
        let second = engine.lint_sources(sources);
        assert_eq!(first.diagnostics, second.diagnostics);
        assert!(std::ptr::eq(pool, engine.runner.pool().unwrap()));

        assert!(Engine::new(sequential()).runner.pool().is_none());
    }
}
