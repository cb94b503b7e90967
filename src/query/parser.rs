//! Recursive-descent parser producing the query AST

use super::lexer::{tokenize, Token};
use super::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Count,
    Not,
    Name,
    LocalName,
    String,
    Number,
    Boolean,
    Contains,
    StartsWith,
    NormalizeSpace,
    StringLength,
    Concat,
    True,
    False,
    Last,
    Position,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Function::Count,
            "not" => Function::Not,
            "name" => Function::Name,
            "local-name" => Function::LocalName,
            "string" => Function::String,
            "number" => Function::Number,
            "boolean" => Function::Boolean,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "normalize-space" => Function::NormalizeSpace,
            "string-length" => Function::StringLength,
            "concat" => Function::Concat,
            "true" => Function::True,
            "false" => Function::False,
            "last" => Function::Last,
            "position" => Function::Position,
            _ => return None,
        })
    }

    /// Accepted argument counts (min, max)
    fn arity(self) -> (usize, usize) {
        match self {
            Function::Count | Function::Not | Function::Boolean => (1, 1),
            Function::Name
            | Function::LocalName
            | Function::String
            | Function::Number
            | Function::NormalizeSpace
            | Function::StringLength => (0, 1),
            Function::Contains | Function::StartsWith => (2, 2),
            Function::Concat => (2, usize::MAX),
            Function::True | Function::False | Function::Last | Function::Position => (0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
    /// Location path, starting at the document node when `absolute`
    Path { absolute: bool, steps: Vec<Step> },
    /// Primary expression with predicates, optionally followed by a path
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

pub(crate) fn parse(source: &str) -> Result<Expr, QueryError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(QueryError::Syntax {
            query: source.to_string(),
            message: "empty query".to_string(),
        });
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected token {:?}", token)));
    }
    Ok(expr)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), QueryError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {:?}, found {:?}",
                expected,
                self.peek()
            )))
        }
    }

    fn error(&self, message: String) -> QueryError {
        QueryError::Syntax {
            query: self.source.to_string(),
            message,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => ArithOp::Mul,
                Some(Token::Div) => ArithOp::Div,
                Some(Token::Mod) => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_filter_expr(&self) -> bool {
        match self.peek() {
            Some(Token::LParen) | Some(Token::Literal(_)) | Some(Token::Number(_)) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !is_node_type(name)
            }
            _ => false,
        }
    }

    fn parse_path_expr(&mut self) -> Result<Expr, QueryError> {
        if !self.starts_filter_expr() {
            return self.parse_location_path();
        }

        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;

        let mut steps = Vec::new();
        if matches!(self.peek(), Some(Token::Slash) | Some(Token::DoubleSlash)) {
            self.parse_relative_steps(&mut steps, true)?;
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Name(name)) => self.parse_call(name),
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, QueryError> {
        let function = Function::from_name(&name).ok_or_else(|| QueryError::UnknownFunction {
            query: self.source.to_string(),
            name: name.clone(),
        })?;
        self.expect(&Token::LParen)?;

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(QueryError::Arity {
                query: self.source.to_string(),
                name,
                expected,
                found: args.len(),
            });
        }

        Ok(Expr::Call(function, args))
    }

    fn parse_location_path(&mut self) -> Result<Expr, QueryError> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if self.starts_step() {
                    self.parse_step_into(&mut steps)?;
                    self.parse_relative_steps(&mut steps, false)?;
                }
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::descendant_or_self());
                self.parse_step_into(&mut steps)?;
                self.parse_relative_steps(&mut steps, false)?;
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ => {
                self.parse_step_into(&mut steps)?;
                self.parse_relative_steps(&mut steps, false)?;
                Ok(Expr::Path {
                    absolute: false,
                    steps,
                })
            }
        }
    }

    /// Parse `('/' | '//') Step` repetitions; `required` demands at least one
    fn parse_relative_steps(
        &mut self,
        steps: &mut Vec<Step>,
        required: bool,
    ) -> Result<(), QueryError> {
        let mut parsed_any = false;
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                }
                _ => break,
            }
            self.parse_step_into(steps)?;
            parsed_any = true;
        }
        if required && !parsed_any {
            return Err(self.error("expected a location step".to_string()));
        }
        Ok(())
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_))
                | Some(Token::Star)
                | Some(Token::At)
                | Some(Token::Dot)
                | Some(Token::DotDot)
        )
    }

    fn parse_step_into(&mut self, steps: &mut Vec<Step>) -> Result<(), QueryError> {
        if self.eat(&Token::Dot) {
            steps.push(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
            return Ok(());
        }
        if self.eat(&Token::DotDot) {
            steps.push(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
            return Ok(());
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unsupported axis '{}'", name)))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if is_node_type(&name) => {
                self.expect(&Token::LParen)?;
                self.expect(&Token::RParen)?;
                match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    other => {
                        return Err(self.error(format!("unsupported node type test '{}()'", other)))
                    }
                }
            }
            Some(Token::Name(name)) => NodeTest::Name(name),
            other => return Err(self.error(format!("expected a node test, found {:?}", other))),
        };

        let predicates = self.parse_predicates()?;
        steps.push(Step {
            axis,
            test,
            predicates,
        });
        Ok(())
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, QueryError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(
        name,
        "text" | "node" | "comment" | "processing-instruction"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_path() {
        let expr = parse("/ExtractVariables/@name").unwrap();
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(absolute);
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0].test, NodeTest::Name("ExtractVariables".into()));
                assert_eq!(steps[1].axis, Axis::Attribute);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_double_slash_expands() {
        let expr = parse("//Step").unwrap();
        match expr {
            Expr::Path { steps, .. } => {
                assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
                assert_eq!(steps[1].test, NodeTest::Name("Step".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_count_sum_comparison() {
        let expr = parse(
            "count(/ExtractVariables/*[(name()='JSONPayload' or name()='XMLPayload')]/Variable) + count(/ExtractVariables/FormParam) > 0",
        )
        .unwrap();
        assert!(matches!(expr, Expr::Compare(CompareOp::Gt, _, _)));
    }

    #[test]
    fn test_parse_nested_predicates() {
        let expr = parse("//Step[Name[text() = 'EV-Body']]").unwrap();
        match expr {
            Expr::Path { steps, .. } => assert_eq!(steps[1].predicates.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_explicit_axis() {
        let expr = parse("ancestor::Flow[1]/Condition").unwrap();
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(!absolute);
                assert_eq!(steps[0].axis, Axis::Ancestor);
                assert_eq!(steps[1].axis, Axis::Child);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_filter_expression() {
        let expr = parse("(//Step)[1]/Name").unwrap();
        assert!(matches!(expr, Expr::Filter { .. }));
    }

    #[test]
    fn test_unknown_function() {
        assert!(matches!(
            parse("frobnicate(Step)"),
            Err(QueryError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_wrong_arity() {
        assert!(matches!(
            parse("count()"),
            Err(QueryError::Arity { found: 0, .. })
        ));
        assert!(matches!(
            parse("contains('a')"),
            Err(QueryError::Arity { .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("Step[").is_err());
        assert!(parse("/Step/").is_err());
        assert!(parse("Step Name").is_err());
        assert!(parse("following::Step").is_err());
    }
}
