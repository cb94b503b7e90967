//! XML document model
//!
//! Documents are parsed once into an arena of nodes. Node ids are assigned
//! in document order, so comparing two ids tells which node comes first in
//! the source.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use thiserror::Error;

/// Error during parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("XML parse error at line {line}: {message}")]
    Xml { line: usize, message: String },
}

impl ParseError {
    /// Line the error was detected on (1-based)
    pub fn line(&self) -> usize {
        match self {
            ParseError::Xml { line, .. } => *line,
        }
    }
}

/// Index of a node inside its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    name: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    line: usize,
    column: usize,
}

/// A parsed XML document
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
    source_lines: Vec<String>,
}

impl Document {
    /// Parse raw XML text
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        let source_lines = content.lines().map(String::from).collect();
        let mut builder = TreeBuilder::new(content);
        builder.run()?;

        Ok(Self {
            nodes: builder.nodes,
            root: builder.root,
            source_lines,
        })
    }

    /// Root element, `None` when the source has no element content
    pub fn root(&self) -> Option<Node<'_>> {
        self.root.map(|id| self.node(id))
    }

    /// Name of the root element
    pub fn root_name(&self) -> Option<&str> {
        self.root().map(|r| r.name())
    }

    /// Borrow a node handle
    ///
    /// Panics if `id` does not belong to this document.
    pub fn node(&self, id: NodeId) -> Node<'_> {
        assert!(id.0 < self.nodes.len(), "node id out of range");
        Node { doc: self, id }
    }

    /// Borrow a node handle, `None` if `id` is out of range
    pub fn get(&self, id: NodeId) -> Option<Node<'_>> {
        (id.0 < self.nodes.len()).then_some(Node { doc: self, id })
    }

    /// Line of a node (1-based)
    pub fn line_of(&self, id: NodeId) -> usize {
        self.data(id).line
    }

    /// Number of nodes (elements and text)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in document order
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        (0..self.nodes.len()).map(move |i| Node {
            doc: self,
            id: NodeId(i),
        })
    }

    /// All elements with the given name, in document order
    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Node<'a>> + 'a {
        self.iter()
            .filter(move |n| n.is_element() && n.name() == name)
    }

    /// Get source line at line number (1-based)
    pub fn source_line(&self, line: usize) -> Option<&str> {
        if line > 0 && line <= self.source_lines.len() {
            Some(&self.source_lines[line - 1])
        } else {
            None
        }
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }
}

/// Borrowed handle to a node of a [`Document`]
#[derive(Clone, Copy)]
pub struct Node<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.kind() == NodeKind::Text
    }

    /// Tag name for elements, `#text` for text nodes
    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    /// Attribute value (entity-decoded)
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.data()
            .attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attributes in source order
    pub fn attributes(&self) -> &'a [(String, String)] {
        &self.data().attrs
    }

    /// Own text of a text node
    pub fn text(&self) -> Option<&'a str> {
        self.data().text.as_deref()
    }

    /// Concatenated text of this node and all its descendants
    pub fn text_content(&self) -> String {
        if let Some(text) = self.text() {
            return text.to_string();
        }
        self.descendants()
            .filter_map(|n| n.text())
            .collect::<Vec<_>>()
            .concat()
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.data().parent.map(|id| self.doc.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        self.data().children.iter().map(move |&id| doc.node(id))
    }

    pub fn child_elements(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        self.children().filter(|c| c.is_element())
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<Node<'a>> {
        self.child_elements().find(|c| c.name() == name)
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self) -> Ancestors<'a> {
        Ancestors {
            next: self.parent(),
        }
    }

    /// Descendants in document order (excluding `self`)
    pub fn descendants(&self) -> Descendants<'a> {
        let mut stack: Vec<NodeId> = self.data().children.clone();
        stack.reverse();
        Descendants {
            doc: self.doc,
            stack,
        }
    }

    pub fn line(&self) -> usize {
        self.data().line
    }

    pub fn column(&self) -> usize {
        self.data().column
    }

    fn data(&self) -> &'a NodeData {
        self.doc.data(self.id)
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id.0)
            .field("name", &self.name())
            .field("line", &self.line())
            .finish()
    }
}

/// Iterator over the ancestors of a node
pub struct Ancestors<'a> {
    next: Option<Node<'a>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

/// Depth-first iterator over the descendants of a node
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.doc.node(id);
        self.stack
            .extend(self.doc.data(id).children.iter().rev().copied());
        Some(node)
    }
}

/// Maps byte offsets to 1-based (line, column)
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    fn line_col(&self, pos: u64) -> (usize, usize) {
        let pos = pos as usize;
        let line = self.line_starts.partition_point(|&start| start <= pos);
        let col = pos - self.line_starts.get(line.saturating_sub(1)).unwrap_or(&0) + 1;
        (line.max(1), col)
    }
}

struct TreeBuilder<'c> {
    content: &'c str,
    lines: LineIndex,
    nodes: Vec<NodeData>,
    stack: Vec<NodeId>,
    root: Option<NodeId>,
}

impl<'c> TreeBuilder<'c> {
    fn new(content: &'c str) -> Self {
        Self {
            content,
            lines: LineIndex::new(content),
            nodes: Vec::new(),
            stack: Vec::new(),
            root: None,
        }
    }

    fn error(&self, pos: u64, message: impl Into<String>) -> ParseError {
        ParseError::Xml {
            line: self.lines.line_col(pos).0,
            message: message.into(),
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let mut reader = Reader::from_str(self.content);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        loop {
            // Position of the first byte of the next event
            let pos = reader.buffer_position();
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => return Err(self.error(reader.buffer_position(), e.to_string())),
            };

            match event {
                Event::Start(e) => {
                    let id = self.open_element(&e, pos)?;
                    self.stack.push(id);
                }

                Event::Empty(e) => {
                    self.open_element(&e, pos)?;
                }

                Event::End(_) => {
                    self.stack.pop();
                }

                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| self.error(pos, err.to_string()))?;
                    // Whitespace-only text is formatting; other text is kept verbatim
                    if !text.trim().is_empty() {
                        let leading = e
                            .iter()
                            .take_while(|b| b.is_ascii_whitespace())
                            .count();
                        self.push_text(&text, pos + leading as u64)?;
                    }
                }

                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    if !text.trim().is_empty() {
                        self.push_text(&text, pos)?;
                    }
                }

                Event::Eof => break,

                _ => {}
            }

            buf.clear();
        }

        if let Some(&open) = self.stack.last() {
            let data = &self.nodes[open.0];
            return Err(ParseError::Xml {
                line: data.line,
                message: format!("unclosed element <{}>", data.name),
            });
        }

        Ok(())
    }

    fn open_element(&mut self, start: &BytesStart<'_>, pos: u64) -> Result<NodeId, ParseError> {
        let (line, column) = self.lines.line_col(pos);
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

        if self.stack.is_empty() && self.root.is_some() {
            return Err(self.error(pos, format!("unexpected second root element <{}>", name)));
        }

        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.error(pos, e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| self.error(pos, e.to_string()))?
                .into_owned();
            attrs.push((key, value));
        }

        let id = self.push(NodeData {
            kind: NodeKind::Element,
            name,
            attrs,
            text: None,
            parent: self.stack.last().copied(),
            children: Vec::new(),
            line,
            column,
        });

        if self.root.is_none() {
            self.root = Some(id);
        }
        Ok(id)
    }

    fn push_text(&mut self, text: &str, pos: u64) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            return Err(self.error(pos, "text outside of the root element"));
        }
        let (line, column) = self.lines.line_col(pos);
        self.push(NodeData {
            kind: NodeKind::Text,
            name: "#text".to_string(),
            attrs: Vec::new(),
            text: Some(text.to_string()),
            parent: self.stack.last().copied(),
            children: Vec::new(),
            line,
            column,
        });
        Ok(())
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(parent) = data.parent {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(data);
        id
    }
}
