//! Check runner
//!
//! Runs every registered check over every parsed document of a bundle:
//!
//! 1. Build the bundle index from all parsed documents and seal it.
//! 2. Evaluate checks per document, in registration order.
//!
//! A failing or panicking check becomes one internal diagnostic for that rule
//! and document; the remaining checks still run. Findings are routed to the
//! document they are attributed to, so a cross-file check evaluated on a
//! policy can report on the proxy that references it.

use crate::bundle::{Bundle, DocumentId};
use crate::check::{CheckError, CheckKind, CheckRegistry, DocumentRef, Finding, RegisteredCheck};
use crate::diagnostic::{Diagnostic, Location, Severity};
use crate::document::Document;
use crate::index::{BundleIndex, IndexBuilder};
use crate::pool;
use crate::query::QueryError;
use log::{debug, trace, warn};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Rule id of diagnostics for documents that failed to parse
pub const PARSE_ERROR_RULE: &str = "parse-error";

/// Diagnostics of one document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReport {
    pub id: DocumentId,
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Diagnostics of a whole bundle, in bundle order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleReport {
    pub documents: Vec<DocumentReport>,
}

impl BundleReport {
    /// Every diagnostic, document by document
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.documents.iter().flat_map(|d| d.diagnostics.iter())
    }

    pub fn for_document(&self, id: DocumentId) -> &[Diagnostic] {
        self.documents
            .get(id.index())
            .map(|d| d.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    /// Diagnostics of the document loaded from `path`
    pub fn for_path(&self, path: &Path) -> &[Diagnostic] {
        self.documents
            .iter()
            .find(|d| d.path == path)
            .map(|d| d.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.documents.iter().map(|d| d.diagnostics.len()).sum()
    }
}

/// Executes a check registry against bundles
#[derive(Debug, Clone, Default)]
pub struct Runner {
    pool: Option<Arc<ThreadPool>>,
    severity_overrides: HashMap<String, Severity>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spread index building and document evaluation over a pool of `jobs`
    /// threads (0 = one per CPU), built once here. Output is identical to a
    /// sequential run.
    pub fn with_parallel(mut self, jobs: usize) -> Self {
        self.pool = pool::build(jobs).map(Arc::new);
        self
    }

    /// Run on an existing pool
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Worker pool, `None` when running sequentially
    pub fn pool(&self) -> Option<&ThreadPool> {
        self.pool.as_deref()
    }

    /// Report `rule_id` with `severity` instead of its default
    pub fn with_severity_override(mut self, rule_id: &str, severity: Severity) -> Self {
        self.severity_overrides.insert(rule_id.to_string(), severity);
        self
    }

    pub fn with_severity_overrides(mut self, overrides: HashMap<String, Severity>) -> Self {
        self.severity_overrides.extend(overrides);
        self
    }

    /// Run every check of `registry` over `bundle`
    pub fn run(&self, registry: &CheckRegistry, bundle: &Bundle) -> BundleReport {
        let start = Instant::now();

        // Phase 1: the index is complete before any cross-file check runs
        let built = match self.pool() {
            Some(pool) => IndexBuilder::build_parallel(bundle, pool),
            None => IndexBuilder::build(bundle),
        };
        let index = built.map(IndexBuilder::seal);
        match &index {
            Ok(index) => debug!("Indexed {} reference sites", index.len()),
            Err(e) => warn!("Bundle index unavailable: {}", e),
        }

        // Phase 2: evaluate
        let parsed: Vec<(DocumentId, &Document)> = bundle.parsed().collect();
        let evaluate = |&(id, doc): &(DocumentId, &Document)| {
            self.evaluate_document(registry, bundle, index.as_ref(), id, doc)
        };
        let emitted: Vec<Vec<(DocumentId, Diagnostic)>> = match self.pool() {
            Some(pool) => pool.install(|| parsed.par_iter().map(evaluate).collect()),
            None => parsed.iter().map(evaluate).collect(),
        };

        let mut documents: Vec<DocumentReport> = bundle
            .iter()
            .map(|(id, source)| DocumentReport {
                id,
                path: source.path.clone(),
                diagnostics: source
                    .parse_error()
                    .map(|e| {
                        Diagnostic::parse_failure(
                            PARSE_ERROR_RULE,
                            &format!("Parse error: {}", e),
                            Location::new(source.path.clone(), e.line(), 1),
                        )
                    })
                    .into_iter()
                    .collect(),
            })
            .collect();

        for (target, diagnostic) in emitted.into_iter().flatten() {
            documents[target.index()].diagnostics.push(diagnostic);
        }

        let report = BundleReport { documents };
        debug!(
            "Ran {} checks over {} documents in {:?}: {} diagnostics",
            registry.len(),
            bundle.len(),
            start.elapsed(),
            report.total()
        );
        report
    }

    /// Run all applicable checks on one document. Returns diagnostics paired
    /// with the document each is reported in.
    fn evaluate_document(
        &self,
        registry: &CheckRegistry,
        bundle: &Bundle,
        index: Result<&BundleIndex, &QueryError>,
        id: DocumentId,
        doc: &Document,
    ) -> Vec<(DocumentId, Diagnostic)> {
        let mut out = Vec::new();
        let Some(root) = doc.root() else {
            trace!("Document {} has no root element, nothing to check", id);
            return out;
        };
        let path = bundle.path(id).unwrap_or_else(|| Path::new(""));
        let doc_ref = DocumentRef::new(id, path, doc);

        for registered in registry.iter() {
            if !registered.rule.applies_to(root.name()) {
                continue;
            }
            trace!("{}: running {}", path.display(), registered.rule.id);

            match run_check(registered, &doc_ref, bundle, index) {
                Ok(findings) => {
                    for finding in findings {
                        out.push(self.to_diagnostic(registered, &doc_ref, bundle, finding));
                    }
                }
                Err(message) => {
                    warn!("{}: rule {} failed: {}", path.display(), registered.rule.id, message);
                    let diagnostic = Diagnostic::internal(
                        &registered.rule.id,
                        &format!("Rule '{}' failed: {}", registered.rule.id, message),
                        Location::new(path.to_path_buf(), root.line(), root.column()),
                    );
                    out.push((id, diagnostic));
                }
            }
        }

        out
    }

    fn to_diagnostic(
        &self,
        registered: &RegisteredCheck,
        current: &DocumentRef<'_>,
        bundle: &Bundle,
        finding: Finding,
    ) -> (DocumentId, Diagnostic) {
        let rule = &registered.rule;
        let Some(source) = bundle.get(finding.document) else {
            let diagnostic = Diagnostic::internal(
                &rule.id,
                &format!(
                    "Rule '{}' reported against unknown document {}",
                    rule.id, finding.document
                ),
                Location::new(current.path.to_path_buf(), finding.line, finding.column),
            );
            return (current.id, diagnostic);
        };

        let severity = self
            .severity_overrides
            .get(&rule.id)
            .copied()
            .unwrap_or(rule.severity);
        let location = Location::new(source.path.clone(), finding.line, finding.column);
        let mut diagnostic = Diagnostic::new(&rule.id, severity, &finding.message, location);

        if let Some(line) = source.document().and_then(|d| d.source_line(finding.line)) {
            diagnostic = diagnostic.with_source_line(line);
        }
        if let Some(desc) = &rule.description {
            diagnostic = diagnostic.with_help(desc);
        }
        if finding.document != current.id {
            diagnostic = diagnostic.with_note(&format!(
                "reported while checking {}",
                current.path.display()
            ));
        }

        (finding.document, diagnostic)
    }
}

/// Invoke one check, turning errors and panics into a message
fn run_check(
    registered: &RegisteredCheck,
    doc: &DocumentRef<'_>,
    bundle: &Bundle,
    index: Result<&BundleIndex, &QueryError>,
) -> Result<Vec<Finding>, String> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &registered.kind {
        CheckKind::Document(check) => check.check(doc),
        CheckKind::Bundle(check) => match index {
            Ok(index) => check.check(doc, bundle, index),
            Err(e) => Err(CheckError::Failed(format!("bundle index unavailable: {}", e))),
        },
    }));

    match outcome {
        Ok(Ok(findings)) => Ok(findings),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{BundleCheck, DocumentCheck};
    use crate::diagnostic::DiagnosticKind;
    use crate::query::Query;
    use crate::rule::Rule;
    use pretty_assertions::assert_eq;

    struct RootFinding(&'static str);

    impl DocumentCheck for RootFinding {
        fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
            let root = doc.root().ok_or_else(|| CheckError::Failed("no root".into()))?;
            Ok(vec![Finding::at(doc, root, self.0)])
        }
    }

    struct BrokenQuery;

    impl DocumentCheck for BrokenQuery {
        fn check(&self, _doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
            Query::compile("count(//Step")?;
            Ok(Vec::new())
        }
    }

    struct Panics;

    impl DocumentCheck for Panics {
        fn check(&self, _doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
            panic!("index out of bounds");
        }
    }

    /// Reports every step referencing the checked policy, in the step's document
    struct ReferencedBy;

    impl BundleCheck for ReferencedBy {
        fn check(
            &self,
            doc: &DocumentRef<'_>,
            bundle: &Bundle,
            index: &BundleIndex,
        ) -> Result<Vec<Finding>, CheckError> {
            let name = doc.root().and_then(|r| r.attribute("name")).unwrap_or_default();
            Ok(index
                .lookup(name)
                .iter()
                .filter_map(|site| {
                    let step = bundle.document(site.document)?.node(site.node);
                    Some(Finding::new(site.document, step.line(), step.column(), name))
                })
                .collect())
        }
    }

    fn bundle(sources: &[(&str, &str)]) -> Bundle {
        Bundle::from_sources(
            sources
                .iter()
                .map(|(p, c)| (PathBuf::from(p), c.to_string())),
        )
    }

    const PROXY: &str = "<ProxyEndpoint name=\"default\">\n  <PreFlow>\n    <Request>\n      <Step><Name>EV-1</Name></Step>\n    </Request>\n  </PreFlow>\n</ProxyEndpoint>";
    const POLICY: &str = "<ExtractVariables name=\"EV-1\"/>";

    fn messages(report: &BundleReport, id: usize) -> Vec<(String, String)> {
        report
            .for_document(DocumentId(id))
            .iter()
            .map(|d| (d.rule_id.clone(), d.message.clone()))
            .collect()
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("second", "Second"), RootFinding("b"));
        registry.register_document(Rule::new("first", "First"), RootFinding("a"));

        let report = Runner::new().run(&registry, &bundle(&[("p.xml", POLICY)]));
        assert_eq!(
            messages(&report, 0),
            vec![
                ("second".to_string(), "b".to_string()),
                ("first".to_string(), "a".to_string())
            ]
        );
    }

    #[test]
    fn test_failing_checks_are_isolated() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("broken-query", "Broken"), BrokenQuery);
        registry.register_document(Rule::new("panics", "Panics"), Panics);
        registry.register_document(Rule::new("works", "Works"), RootFinding("ok"));

        let report = Runner::new().run(&registry, &bundle(&[("p.xml", POLICY)]));
        let diags = report.for_document(DocumentId(0));
        assert_eq!(diags.len(), 3);

        assert_eq!(diags[0].rule_id, "broken-query");
        assert_eq!(diags[0].kind, DiagnosticKind::Internal);
        assert!(diags[0].message.contains("invalid query"));

        assert_eq!(diags[1].rule_id, "panics");
        assert_eq!(diags[1].kind, DiagnosticKind::Internal);
        assert!(diags[1].message.contains("index out of bounds"));

        assert_eq!(diags[2].rule_id, "works");
        assert_eq!(diags[2].kind, DiagnosticKind::Violation);
    }

    #[test]
    fn test_parse_error_isolated_to_document() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("root", "Root"), RootFinding("seen"));

        let report = Runner::new().run(
            &registry,
            &bundle(&[("broken.xml", "<APIProxy>\n<Oops></APIProxy>"), ("p.xml", POLICY)]),
        );

        let broken = report.for_document(DocumentId(0));
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].rule_id, PARSE_ERROR_RULE);
        assert_eq!(broken[0].kind, DiagnosticKind::Parse);

        assert_eq!(messages(&report, 1), vec![("root".to_string(), "seen".to_string())]);
    }

    #[test]
    fn test_empty_document_has_nothing_to_check() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("root", "Root"), RootFinding("seen"));
        let report = Runner::new().run(&registry, &bundle(&[("empty.xml", "  ")]));
        assert!(report.for_document(DocumentId(0)).is_empty());
    }

    #[test]
    fn test_rule_targets_filter_documents() {
        let mut registry = CheckRegistry::new();
        registry.register_document(
            Rule::new("apiproxy-only", "Only").with_target("APIProxy"),
            RootFinding("x"),
        );
        let report = Runner::new().run(&registry, &bundle(&[("p.xml", POLICY)]));
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_cross_file_findings_routed_to_referencing_document() {
        let mut registry = CheckRegistry::new();
        registry.register_bundle(Rule::new("referenced-by", "Referenced"), ReferencedBy);

        // Policy loaded before the proxy that references it
        let report = Runner::new().run(&registry, &bundle(&[("policy.xml", POLICY), ("proxy.xml", PROXY)]));
        assert!(report.for_document(DocumentId(0)).is_empty());

        let diags = report.for_path(Path::new("proxy.xml"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].location.line, 4);
        assert_eq!(diags[0].location.file, PathBuf::from("proxy.xml"));
        assert_eq!(diags[0].notes, vec!["reported while checking policy.xml".to_string()]);
        assert_eq!(
            diags[0].source_line.as_deref(),
            Some("      <Step><Name>EV-1</Name></Step>")
        );
    }

    #[test]
    fn test_severity_override() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("root", "Root"), RootFinding("x"));
        let report = Runner::new()
            .with_severity_override("root", Severity::Error)
            .run(&registry, &bundle(&[("p.xml", POLICY)]));
        assert_eq!(report.for_document(DocumentId(0))[0].severity, Severity::Error);
    }

    #[test]
    fn test_parallel_run_matches_sequential() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("root", "Root"), RootFinding("x"));
        registry.register_bundle(Rule::new("referenced-by", "Referenced"), ReferencedBy);
        let sources = [
            ("policy.xml", POLICY),
            ("proxy.xml", PROXY),
            ("broken.xml", "<a>"),
            ("proxy2.xml", PROXY),
        ];

        let sequential = Runner::new().run(&registry, &bundle(&sources));
        let parallel = Runner::new().with_parallel(3).run(&registry, &bundle(&sources));
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_run_twice_identical() {
        let mut registry = CheckRegistry::new();
        registry.register_bundle(Rule::new("referenced-by", "Referenced"), ReferencedBy);
        let b = bundle(&[("proxy.xml", PROXY), ("policy.xml", POLICY)]);
        let runner = Runner::new();
        assert_eq!(runner.run(&registry, &b), runner.run(&registry, &b));
    }

    #[test]
    fn test_pool_built_once_and_shared() {
        assert!(Runner::new().pool().is_none());

        let runner = Runner::new().with_parallel(2);
        let pool = runner.pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);

        let copy = runner.clone();
        assert!(std::ptr::eq(pool, copy.pool().unwrap()));

        let shared = Arc::new(crate::pool::build(3).unwrap());
        let other = Runner::new().with_pool(Arc::clone(&shared));
        assert!(std::ptr::eq(other.pool().unwrap(), shared.as_ref()));
    }
}
