//! Bundle-wide index of step references
//!
//! Building is two-phase. An [`IndexBuilder`] collects reference sites from
//! every document of a bundle, then [`IndexBuilder::seal`] consumes it and
//! returns the read-only [`BundleIndex`]. Cross-file checks only ever receive
//! a `BundleIndex`, so they cannot observe a partially built index.

use crate::bundle::{Bundle, DocumentId};
use crate::document::{Document, NodeId};
use crate::query::{Query, QueryError};
use log::debug;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashMap;

/// Steps that invoke a named policy
const STEP_REFERENCES: &str = "//Step[Name]";

/// Where a name is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceSite {
    /// Document containing the reference
    pub document: DocumentId,
    /// The referencing `Step` element
    pub node: NodeId,
}

/// Collects reference sites. Append-only.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: HashMap<String, Vec<ReferenceSite>>,
    sites: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference site for `name`
    pub fn record(&mut self, name: &str, document: DocumentId, node: NodeId) {
        self.entries
            .entry(name.to_string())
            .or_default()
            .push(ReferenceSite { document, node });
        self.sites += 1;
    }

    /// Record every step of `doc` that names a policy. Returns the number of
    /// sites recorded.
    pub fn scan(&mut self, document: DocumentId, doc: &Document) -> Result<usize, QueryError> {
        let found = collect_steps(doc)?;
        let count = found.len();
        for (name, node) in found {
            self.record(&name, document, node);
        }
        Ok(count)
    }

    /// Scan every parsed document of `bundle` in bundle order
    pub fn build(bundle: &Bundle) -> Result<Self, QueryError> {
        let mut builder = Self::new();
        for (id, doc) in bundle.parsed() {
            builder.scan(id, doc)?;
        }
        Ok(builder)
    }

    /// Scan documents on `pool`. Sites are merged in bundle order, so the
    /// result equals [`IndexBuilder::build`].
    pub fn build_parallel(bundle: &Bundle, pool: &ThreadPool) -> Result<Self, QueryError> {
        let parsed: Vec<(DocumentId, &Document)> = bundle.parsed().collect();
        let scanned: Vec<Result<Vec<(String, NodeId)>, QueryError>> = pool.install(|| {
            parsed
                .par_iter()
                .map(|(_, doc)| collect_steps(doc))
                .collect()
        });

        let mut builder = Self::new();
        for ((id, _), found) in parsed.iter().zip(scanned) {
            for (name, node) in found? {
                builder.record(&name, *id, node);
            }
        }
        Ok(builder)
    }

    /// Number of sites recorded so far
    pub fn len(&self) -> usize {
        self.sites
    }

    pub fn is_empty(&self) -> bool {
        self.sites == 0
    }

    /// Freeze the index
    pub fn seal(self) -> BundleIndex {
        debug!(
            "Sealed bundle index: {} names, {} reference sites",
            self.entries.len(),
            self.sites
        );
        BundleIndex {
            entries: self.entries,
            sites: self.sites,
        }
    }
}

/// Step elements with a `Name` child, paired with the trimmed name
fn collect_steps(doc: &Document) -> Result<Vec<(String, NodeId)>, QueryError> {
    let query = Query::compile(STEP_REFERENCES)?;
    let steps = query.evaluate_nodes(doc, None)?;
    Ok(steps
        .into_iter()
        .filter_map(|step| {
            let name = step.child("Name")?.text_content();
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), step.id()))
        })
        .collect())
}

/// Read-only index of every reference site in a bundle
#[derive(Debug, Default)]
pub struct BundleIndex {
    entries: HashMap<String, Vec<ReferenceSite>>,
    sites: usize,
}

impl BundleIndex {
    /// Sites referencing `name`, in scan order. Empty when nothing
    /// references it.
    pub fn lookup(&self, name: &str) -> &[ReferenceSite] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether anything in the bundle references `name`
    pub fn is_referenced(&self, name: &str) -> bool {
        !self.lookup(name).is_empty()
    }

    /// Referenced names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Total number of reference sites
    pub fn len(&self) -> usize {
        self.sites
    }

    pub fn is_empty(&self) -> bool {
        self.sites == 0
    }
}
