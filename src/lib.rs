//! proxylint - static analysis for API proxy bundles
//!
//! A proxy bundle is a set of XML files: the proxy descriptor, proxy and
//! target endpoints with their flows, and one file per policy. Flows invoke
//! policies by name through `<Step>` elements, so several rules need to look
//! across files.
//!
//! # Architecture
//!
//! ```text
//! CLI -> Engine -> Bundle -> IndexBuilder --seal--> BundleIndex
//!                    |                                  |
//!                    +--------> Runner <----------------+
//!                                 |
//!                         CheckRegistry (Document / Bundle checks)
//! ```
//!
//! The engine reads and parses every file into a [`Bundle`]. The runner first
//! builds the step-reference index over all parsed documents, then evaluates
//! each registered check per document and routes findings to the document
//! they belong to.
//!
//! # Writing a check
//!
//! ```
//! use proxylint::{CheckError, CheckRegistry, DocumentCheck, DocumentRef, Finding, Rule};
//!
//! struct NoDisplayName;
//!
//! impl DocumentCheck for NoDisplayName {
//!     fn check(&self, doc: &DocumentRef<'_>) -> Result<Vec<Finding>, CheckError> {
//!         let Some(root) = doc.root() else { return Ok(Vec::new()) };
//!         if root.child("DisplayName").is_some() {
//!             return Ok(Vec::new());
//!         }
//!         Ok(vec![Finding::at(doc, root, "missing DisplayName")])
//!     }
//! }
//!
//! let mut registry = CheckRegistry::new();
//! registry.register_document(Rule::new("display-name", "Display name"), NoDisplayName);
//! assert_eq!(registry.len(), 1);
//! ```

pub mod bundle;
pub mod check;
pub mod checks;
pub mod config;
pub mod diagnostic;
pub mod document;
pub mod engine;
pub mod index;
pub mod output;
pub mod pool;
pub mod query;
pub mod rule;
pub mod runner;

// Re-export main types
pub use bundle::{Bundle, DocumentId, SourceDocument};
pub use check::{
    BundleCheck, CheckError, CheckKind, CheckRegistry, DocumentCheck, DocumentRef, Finding,
    RegisteredCheck,
};
pub use config::{Config, ConfigError};
pub use diagnostic::{Diagnostic, DiagnosticKind, Location, Severity};
pub use document::{Document, Node, NodeId, ParseError};
pub use engine::{Engine, EngineError, LintResult};
pub use index::{BundleIndex, IndexBuilder, ReferenceSite};
pub use output::{CompactFormatter, JsonFormatter, OutputFormatter, TextFormatter};
pub use query::{Query, QueryError, Value};
pub use rule::{Rule, RuleCategory};
pub use runner::{BundleReport, DocumentReport, Runner};
