//! Query evaluation against a parsed document

use super::parser::{ArithOp, Axis, CompareOp, Expr, Function, NodeTest, Step};
use super::QueryError;
use crate::document::{Document, NodeId, NodeKind};

/// A member of a node-set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    /// The document node (parent of the root element)
    Root,
    /// An element or text node
    Node(NodeId),
    /// Attribute `index` of an element
    Attribute(NodeId, usize),
}

impl Item {
    /// Key ordering items in document order
    fn order_key(&self) -> (usize, usize) {
        match self {
            Item::Root => (0, 0),
            Item::Node(id) => (id.index() + 1, 0),
            Item::Attribute(id, i) => (id.index() + 1, i + 1),
        }
    }

    /// Element or text node id, if this item is one
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Item::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// XPath string-value
    pub fn string_value(&self, doc: &Document) -> String {
        match self {
            Item::Root => doc.root().map(|r| r.text_content()).unwrap_or_default(),
            Item::Node(id) => doc.node(*id).text_content(),
            Item::Attribute(id, i) => doc
                .node(*id)
                .attributes()
                .get(*i)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }

    fn name(&self, doc: &Document) -> String {
        match self {
            Item::Root => String::new(),
            Item::Node(id) => {
                let node = doc.node(*id);
                if node.is_element() {
                    node.name().to_string()
                } else {
                    String::new()
                }
            }
            Item::Attribute(id, i) => doc
                .node(*id)
                .attributes()
                .get(*i)
                .map(|(k, _)| k.clone())
                .unwrap_or_default(),
        }
    }
}

/// Result of evaluating a query
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<Item>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// XPath `boolean()` conversion
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(items) => !items.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    /// XPath `number()` conversion
    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => parse_number(s),
            Value::Nodes(_) => parse_number(&self.to_string_value(doc)),
        }
    }

    /// XPath `string()` conversion; an empty node-set is the empty string
    pub fn to_string_value(&self, doc: &Document) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Nodes(items) => items
                .first()
                .map(|item| item.string_value(doc))
                .unwrap_or_default(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Context<'d> {
    pub doc: &'d Document,
    pub item: Item,
    pub position: usize,
    pub size: usize,
}

impl<'d> Context<'d> {
    pub fn new(doc: &'d Document, item: Item) -> Self {
        Self {
            doc,
            item,
            position: 1,
            size: 1,
        }
    }

    fn with_item(&self, item: Item, position: usize, size: usize) -> Self {
        Self {
            doc: self.doc,
            item,
            position,
            size,
        }
    }
}

pub(crate) fn evaluate(expr: &Expr, ctx: &Context<'_>, source: &str) -> Result<Value, QueryError> {
    Evaluator { source }.eval(expr, ctx)
}

struct Evaluator<'s> {
    source: &'s str,
}

impl Evaluator<'_> {
    fn type_error(&self, expected: &str, found: &Value) -> QueryError {
        QueryError::Type {
            query: self.source.to_string(),
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        }
    }

    fn eval(&self, expr: &Expr, ctx: &Context<'_>) -> Result<Value, QueryError> {
        match expr {
            Expr::Or(left, right) => {
                if self.eval(left, ctx)?.to_bool() {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.eval(right, ctx)?.to_bool()))
            }

            Expr::And(left, right) => {
                if !self.eval(left, ctx)?.to_bool() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.eval(right, ctx)?.to_bool()))
            }

            Expr::Compare(op, left, right) => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                Ok(Value::Boolean(compare(*op, &left, &right, ctx.doc)))
            }

            Expr::Arith(op, left, right) => {
                let l = self.eval(left, ctx)?.to_number(ctx.doc);
                let r = self.eval(right, ctx)?.to_number(ctx.doc);
                Ok(Value::Number(match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                    ArithOp::Mod => l % r,
                }))
            }

            Expr::Negate(inner) => Ok(Value::Number(-self.eval(inner, ctx)?.to_number(ctx.doc))),

            Expr::Union(left, right) => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                match (left, right) {
                    (Value::Nodes(mut a), Value::Nodes(b)) => {
                        a.extend(b);
                        Ok(Value::Nodes(sort_dedup(a)))
                    }
                    (Value::Nodes(_), other) | (other, _) => Err(self.type_error("node-set", &other)),
                }
            }

            Expr::Literal(s) => Ok(Value::String(s.clone())),

            Expr::Number(n) => Ok(Value::Number(*n)),

            Expr::Call(function, args) => self.call(*function, args, ctx),

            Expr::Path { absolute, steps } => {
                let start = if *absolute { Item::Root } else { ctx.item };
                let items = self.apply_steps(vec![start], steps, ctx)?;
                Ok(Value::Nodes(items))
            }

            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut items = match self.eval(primary, ctx)? {
                    Value::Nodes(items) => sort_dedup(items),
                    other => return Err(self.type_error("node-set", &other)),
                };
                for predicate in predicates {
                    items = self.filter(items, predicate, ctx)?;
                }
                let items = self.apply_steps(items, steps, ctx)?;
                Ok(Value::Nodes(items))
            }
        }
    }

    fn apply_steps(
        &self,
        mut items: Vec<Item>,
        steps: &[Step],
        ctx: &Context<'_>,
    ) -> Result<Vec<Item>, QueryError> {
        for step in steps {
            let mut next = Vec::new();
            for item in &items {
                let candidates: Vec<Item> = axis_items(ctx.doc, *item, step.axis)
                    .into_iter()
                    .filter(|c| matches_test(ctx.doc, *c, step.axis, &step.test))
                    .collect();
                let mut selected = candidates;
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate, ctx)?;
                }
                next.extend(selected);
            }
            items = sort_dedup(next);
        }
        Ok(items)
    }

    /// Keep the items for which `predicate` holds, positions in the given order
    fn filter(
        &self,
        items: Vec<Item>,
        predicate: &Expr,
        ctx: &Context<'_>,
    ) -> Result<Vec<Item>, QueryError> {
        let size = items.len();
        let mut kept = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let inner = ctx.with_item(item, i + 1, size);
            let keep = match self.eval(predicate, &inner)? {
                Value::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    fn string_arg(&self, args: &[Expr], index: usize, ctx: &Context<'_>) -> Result<String, QueryError> {
        match args.get(index) {
            Some(arg) => Ok(self.eval(arg, ctx)?.to_string_value(ctx.doc)),
            None => Ok(ctx.item.string_value(ctx.doc)),
        }
    }

    fn call(&self, function: Function, args: &[Expr], ctx: &Context<'_>) -> Result<Value, QueryError> {
        let doc = ctx.doc;
        Ok(match function {
            Function::Count => {
                let value = self.eval(&args[0], ctx)?;
                match value {
                    Value::Nodes(items) => Value::Number(items.len() as f64),
                    other => return Err(self.type_error("node-set", &other)),
                }
            }
            Function::Not => Value::Boolean(!self.eval(&args[0], ctx)?.to_bool()),
            Function::Boolean => Value::Boolean(self.eval(&args[0], ctx)?.to_bool()),
            Function::Name | Function::LocalName => {
                let item = match args.first() {
                    Some(arg) => match self.eval(arg, ctx)? {
                        Value::Nodes(items) => items.first().copied(),
                        other => return Err(self.type_error("node-set", &other)),
                    },
                    None => Some(ctx.item),
                };
                let name = item.map(|i| i.name(doc)).unwrap_or_default();
                if function == Function::LocalName {
                    let local = name.rsplit(':').next().unwrap_or_default().to_string();
                    Value::String(local)
                } else {
                    Value::String(name)
                }
            }
            Function::String => Value::String(self.string_arg(args, 0, ctx)?),
            Function::Number => match args.first() {
                Some(arg) => Value::Number(self.eval(arg, ctx)?.to_number(doc)),
                None => Value::Number(parse_number(&ctx.item.string_value(doc))),
            },
            Function::Contains => {
                let haystack = self.string_arg(args, 0, ctx)?;
                let needle = self.string_arg(args, 1, ctx)?;
                Value::Boolean(haystack.contains(&needle))
            }
            Function::StartsWith => {
                let haystack = self.string_arg(args, 0, ctx)?;
                let prefix = self.string_arg(args, 1, ctx)?;
                Value::Boolean(haystack.starts_with(&prefix))
            }
            Function::NormalizeSpace => {
                let s = self.string_arg(args, 0, ctx)?;
                Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Function::StringLength => {
                let s = self.string_arg(args, 0, ctx)?;
                Value::Number(s.chars().count() as f64)
            }
            Function::Concat => {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&self.string_arg(args, i, ctx)?);
                }
                Value::String(out)
            }
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Last => Value::Number(ctx.size as f64),
            Function::Position => Value::Number(ctx.position as f64),
        })
    }
}

fn sort_dedup(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by_key(|i| i.order_key());
    items.dedup();
    items
}

/// Items reachable from `item` along `axis`, in axis order
fn axis_items(doc: &Document, item: Item, axis: Axis) -> Vec<Item> {
    let node_children = |item: Item| -> Vec<Item> {
        match item {
            Item::Root => doc.root().map(|r| Item::Node(r.id())).into_iter().collect(),
            Item::Node(id) => doc.node(id).children().map(|c| Item::Node(c.id())).collect(),
            Item::Attribute(..) => Vec::new(),
        }
    };
    let descendants = |item: Item| -> Vec<Item> {
        match item {
            Item::Root => doc.iter().map(|n| Item::Node(n.id())).collect(),
            Item::Node(id) => doc
                .node(id)
                .descendants()
                .map(|n| Item::Node(n.id()))
                .collect(),
            Item::Attribute(..) => Vec::new(),
        }
    };
    let parent = |item: Item| -> Option<Item> {
        match item {
            Item::Root => None,
            Item::Node(id) => Some(
                doc.node(id)
                    .parent()
                    .map(|p| Item::Node(p.id()))
                    .unwrap_or(Item::Root),
            ),
            Item::Attribute(id, _) => Some(Item::Node(id)),
        }
    };

    match axis {
        Axis::Child => node_children(item),
        Axis::Descendant => descendants(item),
        Axis::DescendantOrSelf => {
            let mut out = vec![item];
            out.extend(descendants(item));
            out
        }
        Axis::Parent => parent(item).into_iter().collect(),
        Axis::Ancestor | Axis::AncestorOrSelf => {
            let mut out = Vec::new();
            if axis == Axis::AncestorOrSelf {
                out.push(item);
            }
            let mut current = parent(item);
            while let Some(p) = current {
                out.push(p);
                current = parent(p);
            }
            out
        }
        Axis::SelfAxis => vec![item],
        Axis::Attribute => match item {
            Item::Node(id) => (0..doc.node(id).attributes().len())
                .map(|i| Item::Attribute(id, i))
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn matches_test(doc: &Document, item: Item, axis: Axis, test: &NodeTest) -> bool {
    match (item, test) {
        (_, NodeTest::Node) => true,
        (Item::Attribute(id, i), NodeTest::Name(name)) => doc
            .node(id)
            .attributes()
            .get(i)
            .is_some_and(|(k, _)| k == name),
        (Item::Attribute(..), NodeTest::Any) => axis == Axis::Attribute,
        (Item::Attribute(..), NodeTest::Text) => false,
        (Item::Root, _) => false,
        (Item::Node(id), NodeTest::Text) => doc.node(id).kind() == NodeKind::Text,
        (Item::Node(id), NodeTest::Any) => doc.node(id).is_element(),
        (Item::Node(id), NodeTest::Name(name)) => {
            let node = doc.node(id);
            node.is_element() && node.name() == name
        }
    }
}

fn compare_atoms(op: CompareOp, left: &Value, right: &Value, doc: &Document) -> bool {
    match op {
        CompareOp::Eq | CompareOp::NotEq => {
            let equal = if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
                left.to_bool() == right.to_bool()
            } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                left.to_number(doc) == right.to_number(doc)
            } else {
                left.to_string_value(doc) == right.to_string_value(doc)
            };
            if op == CompareOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let l = left.to_number(doc);
            let r = right.to_number(doc);
            match op {
                CompareOp::Lt => l < r,
                CompareOp::Le => l <= r,
                CompareOp::Gt => l > r,
                _ => l >= r,
            }
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value, doc: &Document) -> bool {
    match (left, right) {
        (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
            let xs = Value::String(x.string_value(doc));
            b.iter()
                .any(|y| compare_atoms(op, &xs, &Value::String(y.string_value(doc)), doc))
        }),
        (Value::Nodes(_), Value::Boolean(_)) | (Value::Boolean(_), Value::Nodes(_)) => {
            compare_atoms(op, &Value::Boolean(left.to_bool()), &Value::Boolean(right.to_bool()), doc)
        }
        (Value::Nodes(a), atom) => a
            .iter()
            .any(|x| compare_atoms(op, &Value::String(x.string_value(doc)), atom, doc)),
        (atom, Value::Nodes(b)) => b
            .iter()
            .any(|y| compare_atoms(op, atom, &Value::String(y.string_value(doc)), doc)),
        _ => compare_atoms(op, left, right, doc),
    }
}
