//! Structural queries over parsed documents
//!
//! A small XPath 1.0 subset: location paths with the common axes, predicates,
//! comparisons, arithmetic and the handful of functions rules need. Queries
//! are compiled once and evaluated against a [`Document`], optionally from a
//! context node.

mod eval;
mod lexer;
mod parser;

pub use eval::{Item, Value};

use crate::document::{Document, Node, NodeId};
use eval::Context;
use parser::Expr;
use thiserror::Error;

/// Query compilation or evaluation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("invalid query '{query}': unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar {
        query: String,
        ch: char,
        offset: usize,
    },

    #[error("invalid query '{query}': {message}")]
    Syntax { query: String, message: String },

    #[error("invalid query '{query}': unknown function '{name}'")]
    UnknownFunction { query: String, name: String },

    #[error("invalid query '{query}': {name}() takes {expected} argument(s), found {found}")]
    Arity {
        query: String,
        name: String,
        expected: String,
        found: usize,
    },

    #[error("query '{query}' expected a {expected}, found a {found}")]
    Type {
        query: String,
        expected: String,
        found: String,
    },
}

/// A compiled query
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    expr: Expr,
}

impl Query {
    /// Compile a query expression
    pub fn compile(source: &str) -> Result<Self, QueryError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate against `doc`. Relative paths start at `context`, or at the
    /// document node when `context` is `None`.
    pub fn evaluate(&self, doc: &Document, context: Option<NodeId>) -> Result<Value, QueryError> {
        let item = context.map(Item::Node).unwrap_or(Item::Root);
        eval::evaluate(&self.expr, &Context::new(doc, item), &self.source)
    }

    /// Evaluate to the element and text nodes selected, in document order.
    /// Attributes and the document node are skipped.
    pub fn evaluate_nodes<'d>(
        &self,
        doc: &'d Document,
        context: Option<NodeId>,
    ) -> Result<Vec<Node<'d>>, QueryError> {
        match self.evaluate(doc, context)? {
            Value::Nodes(items) => Ok(items
                .iter()
                .filter_map(Item::node_id)
                .map(|id| doc.node(id))
                .collect()),
            other => Err(QueryError::Type {
                query: self.source.clone(),
                expected: "node-set".to_string(),
                found: type_name(&other).to_string(),
            }),
        }
    }

    /// Evaluate and convert with `string()`; a missing node yields `""`
    pub fn evaluate_string(&self, doc: &Document, context: Option<NodeId>) -> Result<String, QueryError> {
        Ok(self.evaluate(doc, context)?.to_string_value(doc))
    }

    /// Evaluate and convert with `number()`
    pub fn evaluate_number(&self, doc: &Document, context: Option<NodeId>) -> Result<f64, QueryError> {
        Ok(self.evaluate(doc, context)?.to_number(doc))
    }

    /// Evaluate and convert with `boolean()`
    pub fn evaluate_bool(&self, doc: &Document, context: Option<NodeId>) -> Result<bool, QueryError> {
        Ok(self.evaluate(doc, context)?.to_bool())
    }
}

impl std::str::FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Query::compile(s)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nodes(_) => "node-set",
        Value::Boolean(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}

/// Closest ancestor of `node` (excluding `node` itself) matching `predicate`
pub fn nearest_ancestor<'a, P>(node: Node<'a>, predicate: P) -> Option<Node<'a>>
where
    P: Fn(&Node<'a>) -> bool,
{
    node.ancestors().find(|a| predicate(a))
}

/// A conditional `Flow` element. `PreFlow` and `PostFlow` wrappers do not
/// match, so a climb from a step passes through them.
pub fn is_enclosing_flow(node: &Node<'_>) -> bool {
    node.is_element() && node.name() == "Flow"
}
