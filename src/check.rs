//! Check contracts and the check registry
//!
//! A check is either a single-document check or a cross-file check. Both
//! return [`Finding`]s; only cross-file checks are handed the sealed
//! [`BundleIndex`], and the runner creates that index before any of them
//! runs.

use crate::bundle::{Bundle, DocumentId};
use crate::document::{Document, Node};
use crate::index::BundleIndex;
use crate::query::QueryError;
use crate::rule::Rule;
use std::path::Path;
use thiserror::Error;

/// Failure of a check on one document
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{0}")]
    Failed(String),
}

/// The document a check is evaluated on
#[derive(Debug, Clone, Copy)]
pub struct DocumentRef<'a> {
    pub id: DocumentId,
    pub path: &'a Path,
    pub doc: &'a Document,
}

impl<'a> DocumentRef<'a> {
    pub fn new(id: DocumentId, path: &'a Path, doc: &'a Document) -> Self {
        Self { id, path, doc }
    }

    /// Root element, `None` for a document without element content. The
    /// runner never hands such a document to a check.
    pub fn root(&self) -> Option<Node<'a>> {
        self.doc.root()
    }

    pub fn root_name(&self) -> Option<&'a str> {
        self.doc.root_name()
    }
}

/// A violation found by a check, attributed to a document of the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Document the violation is reported in
    pub document: DocumentId,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Finding {
    pub fn new(document: DocumentId, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            document,
            line,
            column,
            message: message.into(),
        }
    }

    /// Finding located at `node` of the document being checked
    pub fn at(doc: &DocumentRef<'_>, node: Node<'_>, message: impl Into<String>) -> Self {
        Self::new(doc.id, node.line(), node.column(), message)
    }
}

/// A check that only needs the document it runs on
pub trait DocumentCheck: Send + Sync {
    fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError>;
}

/// A check that looks at other documents through the bundle index
pub trait BundleCheck: Send + Sync {
    fn check(
        &self,
        doc: &DocumentRef<'_>,
        bundle: &Bundle,
        index: &BundleIndex,
    ) -> Result<Vec<Finding>, CheckError>;
}

pub enum CheckKind {
    Document(Box<dyn DocumentCheck>),
    Bundle(Box<dyn BundleCheck>),
}

impl CheckKind {
    pub fn is_cross_file(&self) -> bool {
        matches!(self, CheckKind::Bundle(_))
    }
}

impl std::fmt::Debug for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Document(_) => write!(f, "Document(..)"),
            CheckKind::Bundle(_) => write!(f, "Bundle(..)"),
        }
    }
}

/// A rule and the check implementing it
#[derive(Debug)]
pub struct RegisteredCheck {
    pub rule: Rule,
    pub kind: CheckKind,
}

/// Checks in registration order
#[derive(Debug, Default)]
pub struct CheckRegistry {
    checks: Vec<RegisteredCheck>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single-document check
    pub fn register_document<C>(&mut self, rule: Rule, check: C)
    where
        C: DocumentCheck + 'static,
    {
        self.checks.push(RegisteredCheck {
            rule,
            kind: CheckKind::Document(Box::new(check)),
        });
    }

    /// Register a cross-file check
    pub fn register_bundle<C>(&mut self, rule: Rule, check: C)
    where
        C: BundleCheck + 'static,
    {
        self.checks.push(RegisteredCheck {
            rule: rule.cross_file(),
            kind: CheckKind::Bundle(Box::new(check)),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredCheck> {
        self.checks.iter()
    }

    /// Metadata of every registered rule, in registration order
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.checks.iter().map(|c| &c.rule)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredCheck> {
        self.checks.iter().find(|c| c.rule.id == id)
    }

    /// Keep only the checks whose rule satisfies `keep`
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Rule) -> bool,
    {
        self.checks.retain(|c| keep(&c.rule));
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct RootName;

    impl DocumentCheck for RootName {
        fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
            let Some(root) = doc.root() else {
                return Ok(Vec::new());
            };
            Ok(vec![Finding::at(doc, root, root.name())])
        }
    }

    struct Referenced;

    impl BundleCheck for Referenced {
        fn check(
            &self,
            doc: &DocumentRef<'_>,
            _bundle: &Bundle,
            index: &BundleIndex,
        ) -> Result<Vec<Finding>, CheckError> {
            let name = doc.root().and_then(|r| r.attribute("name")).unwrap_or_default();
            if index.is_referenced(name) {
                Ok(Vec::new())
            } else {
                Err(CheckError::Failed(format!("{} is unreferenced", name)))
            }
        }
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("b-rule", "B"), RootName);
        registry.register_bundle(Rule::new("a-rule", "A"), Referenced);
        registry.register_document(Rule::new("c-rule", "C"), RootName);

        let ids: Vec<_> = registry.rules().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b-rule", "a-rule", "c-rule"]);
        assert!(registry.get("a-rule").unwrap().rule.cross_file);
        assert!(registry.get("a-rule").unwrap().kind.is_cross_file());
        assert!(!registry.get("b-rule").unwrap().kind.is_cross_file());
    }

    #[test]
    fn test_registry_retain() {
        let mut registry = CheckRegistry::new();
        registry.register_document(Rule::new("keep", "Keep"), RootName);
        registry.register_document(Rule::new("drop", "Drop"), RootName);
        registry.retain(|rule| rule.id != "drop");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("drop").is_none());
    }

    #[test]
    fn test_finding_at_node() {
        let doc = Document::parse("<APIProxy name=\"p\">\n  <ProxyEndpoints/>\n</APIProxy>").unwrap();
        let path = PathBuf::from("apiproxy/p.xml");
        let doc_ref = DocumentRef::new(DocumentId(3), &path, &doc);

        let findings = RootName.check(&doc_ref).unwrap();
        assert_eq!(findings, vec![Finding::new(DocumentId(3), 1, 1, "APIProxy")]);

        let endpoints = doc.root().unwrap().child("ProxyEndpoints").unwrap();
        let finding = Finding::at(&doc_ref, endpoints, "x");
        assert_eq!((finding.line, finding.column), (2, 3));
    }

    #[test]
    fn test_check_error_display() {
        let err: CheckError = crate::query::Query::compile("//Step[").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid query"));

        let err: CheckError = regex::Regex::new("(").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid pattern"));
    }

    #[test]
    fn test_root_absent_without_elements() {
        let doc = Document::parse("<?xml version=\"1.0\"?>\n").unwrap();
        let path = PathBuf::from("empty.xml");
        let doc_ref = DocumentRef::new(DocumentId(0), &path, &doc);
        assert!(doc_ref.root().is_none());
        assert!(doc_ref.root_name().is_none());
        assert!(RootName.check(&doc_ref).unwrap().is_empty());
    }
}
