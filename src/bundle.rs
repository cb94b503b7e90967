//! Bundle of documents analyzed together
//!
//! A bundle keeps every loaded document in load order, parsed or not. A
//! document that failed to parse stays in the bundle so that its error can be
//! reported, but no check ever sees it.

use crate::document::{Document, ParseError};
use log::debug;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};

/// Position of a document in its bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub(crate) usize);

impl DocumentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A loaded document and the outcome of parsing it
#[derive(Debug)]
pub struct SourceDocument {
    /// Path the document was loaded from
    pub path: PathBuf,
    /// Parsed tree, or the reason it could not be parsed
    pub parsed: Result<Document, ParseError>,
}

impl SourceDocument {
    /// Parse `content` loaded from `path`
    pub fn parse(path: PathBuf, content: &str) -> Self {
        let parsed = Document::parse(content);
        if let Err(e) = &parsed {
            debug!("{}: {}", path.display(), e);
        }
        Self { path, parsed }
    }

    pub fn document(&self) -> Option<&Document> {
        self.parsed.as_ref().ok()
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parsed.as_ref().err()
    }
}

/// All documents of one proxy configuration
#[derive(Debug, Default)]
pub struct Bundle {
    documents: Vec<SourceDocument>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `(path, content)` pairs one after another, keeping their order
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        let mut bundle = Self::new();
        for (path, content) in sources {
            bundle.add_source(path, &content);
        }
        bundle
    }

    /// Parse `(path, content)` pairs on `pool`, keeping their order
    pub fn from_sources_parallel(sources: Vec<(PathBuf, String)>, pool: &ThreadPool) -> Self {
        let documents = pool.install(|| {
            sources
                .into_par_iter()
                .map(|(path, content)| SourceDocument::parse(path, &content))
                .collect()
        });
        Self { documents }
    }

    /// Parse and append a document
    pub fn add_source(&mut self, path: PathBuf, content: &str) -> DocumentId {
        self.push(SourceDocument::parse(path, content))
    }

    /// Append an already parsed document
    pub fn push(&mut self, document: SourceDocument) -> DocumentId {
        self.documents.push(document);
        DocumentId(self.documents.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: DocumentId) -> Option<&SourceDocument> {
        self.documents.get(id.0)
    }

    /// Parsed tree of a document, `None` when it failed to parse
    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.get(id).and_then(SourceDocument::document)
    }

    pub fn path(&self, id: DocumentId) -> Option<&Path> {
        self.get(id).map(|d| d.path.as_path())
    }

    /// Every document in load order
    pub fn iter(&self) -> impl Iterator<Item = (DocumentId, &SourceDocument)> + '_ {
        self.documents
            .iter()
            .enumerate()
            .map(|(i, d)| (DocumentId(i), d))
    }

    /// Successfully parsed documents in load order
    pub fn parsed(&self) -> impl Iterator<Item = (DocumentId, &Document)> + '_ {
        self.iter()
            .filter_map(|(id, d)| d.document().map(|doc| (id, doc)))
    }

    /// Number of documents that failed to parse
    pub fn failed_count(&self) -> usize {
        self.documents.iter().filter(|d| d.parsed.is_err()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<(PathBuf, String)> {
        vec![
            (
                PathBuf::from("apiproxy/proxies/default.xml"),
                "<ProxyEndpoint name=\"default\"/>".to_string(),
            ),
            (
                PathBuf::from("apiproxy/policies/broken.xml"),
                "<ExtractVariables name=\"EV-1\">".to_string(),
            ),
            (
                PathBuf::from("apiproxy/policies/EV-1.xml"),
                "<ExtractVariables name=\"EV-1\"/>".to_string(),
            ),
        ]
    }

    #[test]
    fn test_from_sources_keeps_order() {
        let bundle = Bundle::from_sources(sources());
        assert_eq!(bundle.len(), 3);
        let paths: Vec<_> = bundle.iter().map(|(_, d)| d.path.clone()).collect();
        assert_eq!(paths[0], PathBuf::from("apiproxy/proxies/default.xml"));
        assert_eq!(paths[2], PathBuf::from("apiproxy/policies/EV-1.xml"));
    }

    #[test]
    fn test_parse_failure_isolated() {
        let bundle = Bundle::from_sources(sources());
        assert_eq!(bundle.failed_count(), 1);

        let broken = bundle.get(DocumentId(1)).unwrap();
        assert!(broken.parse_error().is_some());
        assert!(bundle.document(DocumentId(1)).is_none());

        let parsed: Vec<_> = bundle.parsed().map(|(id, _)| id.index()).collect();
        assert_eq!(parsed, vec![0, 2]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = Bundle::from_sources(sources());
        let pool = crate::pool::build(2).unwrap();
        let parallel = Bundle::from_sources_parallel(sources(), &pool);

        assert_eq!(sequential.len(), parallel.len());
        for ((_, a), (_, b)) in sequential.iter().zip(parallel.iter()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.parsed.is_ok(), b.parsed.is_ok());
        }
    }

    #[test]
    fn test_lookup_by_id() {
        let mut bundle = Bundle::new();
        let id = bundle.add_source(PathBuf::from("a.xml"), "<APIProxy name=\"a\"/>");
        assert_eq!(id.index(), 0);
        assert_eq!(bundle.path(id), Some(Path::new("a.xml")));
        assert_eq!(bundle.document(id).unwrap().root_name(), Some("APIProxy"));
        assert!(bundle.get(DocumentId(5)).is_none());
    }
}
