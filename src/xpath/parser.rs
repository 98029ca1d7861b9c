//! Query parser: token stream to expression tree.
//!
//! Operator names (`and`, `or`, `div`, `mod`) and `*` are resolved by
//! position: they are operators only where a binary operator is expected,
//! so elements named `div` still work as node tests.

use crate::xpath::error::XPathError;
use crate::xpath::lexer::{lex, SpannedToken, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    Parent,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    Namespace,
    SelfAxis,
    DescendantOrSelf,
    AncestorOrSelf,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            "self" => Axis::SelfAxis,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    /// Name test against the axis's principal node type.
    Name(String),
    /// `*`
    Wildcard,
    /// `node()`
    AnyNode,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()` with optional target literal.
    Pi(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EqOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddOp {
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MulOp {
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathStart {
    /// Absolute path: starts at the document root.
    Root,
    /// Relative path: starts at the context item.
    Context,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Literal(String),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Equality(EqOp, Box<Expr>, Box<Expr>),
    Relational(RelOp, Box<Expr>, Box<Expr>),
    Additive(AddOp, Box<Expr>, Box<Expr>),
    Multiplicative(MulOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Function(String, Vec<Expr>),
    /// A location path. An empty step list with `PathStart::Root` is the
    /// bare `/` expression.
    Path {
        start: PathStart,
        steps: Vec<Step>,
    },
    /// A primary expression filtered by predicates and continued by steps,
    /// such as `f(x)[1]/a`.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

pub(crate) fn parse(text: &str) -> Result<Expr, XPathError> {
    let tokens = lex(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    let trailing = parser.current();
    if trailing.token != Token::Eof {
        return Err(XPathError::syntax(
            trailing.offset,
            "unexpected token after expression",
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn bump(&mut self) -> SpannedToken {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if &self.current().token == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), XPathError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(XPathError::syntax(
                self.current().offset,
                format!("expected {what}"),
            ))
        }
    }

    /// True when the next token is the operator name `word`. Only called
    /// where a binary operator is expected.
    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(&self.current().token, Token::Name(n) if n == word) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, XPathError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_and()?;
        while self.eat_word("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_equality()?;
        while self.eat_word("and") {
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.eat(&Token::Eq) {
                EqOp::Eq
            } else if self.eat(&Token::Ne) {
                EqOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_relational()?;
            lhs = Expr::Equality(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.eat(&Token::Lt) {
                RelOp::Lt
            } else if self.eat(&Token::Le) {
                RelOp::Le
            } else if self.eat(&Token::Gt) {
                RelOp::Gt
            } else if self.eat(&Token::Ge) {
                RelOp::Ge
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_additive()?;
            lhs = Expr::Relational(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                AddOp::Add
            } else if self.eat(&Token::Minus) {
                AddOp::Subtract
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Additive(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                MulOp::Multiply
            } else if self.eat_word("div") {
                MulOp::Divide
            } else if self.eat_word("mod") {
                MulOp::Modulo
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Multiplicative(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            Ok(Expr::Negate(Box::new(inner)))
        } else {
            self.parse_union()
        }
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut lhs = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_path_expr()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_path_expr(&mut self) -> Result<Expr, XPathError> {
        match &self.current().token {
            Token::Slash | Token::DoubleSlash | Token::Dot | Token::DotDot | Token::At
            | Token::Star => self.parse_location_path(),
            Token::Name(name) => {
                if *self.peek(1) == Token::LParen && !is_node_type(name) {
                    self.parse_filter_expr()
                } else {
                    self.parse_location_path()
                }
            }
            Token::Number(_) | Token::Literal(_) | Token::LParen => self.parse_filter_expr(),
            _ => Err(XPathError::syntax(
                self.current().offset,
                "expected expression",
            )),
        }
    }

    fn parse_filter_expr(&mut self) -> Result<Expr, XPathError> {
        let primary = match self.bump() {
            SpannedToken {
                token: Token::Number(n),
                ..
            } => Expr::Number(n),
            SpannedToken {
                token: Token::Literal(s),
                ..
            } => Expr::Literal(s),
            SpannedToken {
                token: Token::LParen,
                ..
            } => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                inner
            }
            SpannedToken {
                token: Token::Name(name),
                ..
            } => {
                self.expect(Token::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                }
                Expr::Function(name, args)
            }
            other => {
                return Err(XPathError::syntax(other.offset, "expected expression"));
            }
        };

        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(Token::RBracket, "']'")?;
        }

        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self_step());
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }

        if predicates.is_empty() && steps.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            })
        }
    }

    fn parse_location_path(&mut self) -> Result<Expr, XPathError> {
        let (start, mut steps) = if self.eat(&Token::DoubleSlash) {
            (PathStart::Root, vec![descendant_or_self_step()])
        } else if self.eat(&Token::Slash) {
            if self.starts_step() {
                (PathStart::Root, Vec::new())
            } else {
                // Bare '/' selects the document root.
                return Ok(Expr::Path {
                    start: PathStart::Root,
                    steps: Vec::new(),
                });
            }
        } else {
            (PathStart::Context, Vec::new())
        };

        steps.push(self.parse_step()?);
        loop {
            if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self_step());
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }
        Ok(Expr::Path { start, steps })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.current().token,
            Token::Name(_) | Token::Star | Token::Dot | Token::DotDot | Token::At
        )
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if matches!(self.current().token, Token::Name(_))
            && *self.peek(1) == Token::ColonColon
        {
            let tok = self.bump();
            let name = match tok.token {
                Token::Name(name) => name,
                _ => String::new(),
            };
            self.bump(); // '::'
            Axis::from_name(&name)
                .ok_or_else(|| XPathError::syntax(tok.offset, format!("unknown axis '{name}'")))?
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(Token::RBracket, "']'")?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        if self.eat(&Token::Star) {
            return Ok(NodeTest::Wildcard);
        }
        let tok = self.bump();
        let name = match tok.token {
            Token::Name(name) => name,
            _ => return Err(XPathError::syntax(tok.offset, "expected node test")),
        };
        if self.current().token != Token::LParen {
            return Ok(NodeTest::Name(name));
        }
        self.bump(); // '('
        let test = match name.as_str() {
            "node" => NodeTest::AnyNode,
            "text" => NodeTest::Text,
            "comment" => NodeTest::Comment,
            "processing-instruction" => {
                if let Token::Literal(target) = self.current().token.clone() {
                    self.bump();
                    self.expect(Token::RParen, "')'")?;
                    return Ok(NodeTest::Pi(Some(target)));
                }
                NodeTest::Pi(None)
            }
            _ => {
                return Err(XPathError::syntax(
                    tok.offset,
                    format!("unknown node type '{name}'"),
                ));
            }
        };
        self.expect(Token::RParen, "')'")?;
        Ok(test)
    }
}

pub(crate) fn descendant_or_self_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(
        name,
        "node" | "text" | "comment" | "processing-instruction"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_paths() {
        let expr = parse("/a/b").unwrap();
        match expr {
            Expr::Path { start, steps } => {
                assert_eq!(start, PathStart::Root);
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0].axis, Axis::Child);
                assert_eq!(steps[0].test, NodeTest::Name("a".into()));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn double_slash_inserts_descendant_or_self() {
        let expr = parse("//item").unwrap();
        match expr {
            Expr::Path { start, steps } => {
                assert_eq!(start, PathStart::Root);
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
                assert_eq!(steps[0].test, NodeTest::AnyNode);
                assert_eq!(steps[1].test, NodeTest::Name("item".into()));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn numbers_parse_and_reject_trailing_garbage() {
        assert!(parse("0").is_ok());
        assert!(parse("123").is_ok());
        assert!(parse("123.456").is_ok());
        assert!(parse(".123").is_ok());
        assert!(parse("123.4567890625").is_ok());
        assert!(parse("123a").is_err());
        assert!(parse("123.a").is_err());
        assert!(parse(".123a").is_err());
    }

    #[test]
    fn literals_parse() {
        assert_eq!(parse("'a\"b'").unwrap(), Expr::Literal("a\"b".into()));
        assert_eq!(parse("\"a'b\"").unwrap(), Expr::Literal("a'b".into()));
        assert_eq!(parse("''").unwrap(), Expr::Literal(String::new()));
        assert!(parse("'unterminated").is_err());
    }

    #[test]
    fn operator_names_are_contextual() {
        // 'div' in operator position divides; in step position it is a name.
        assert!(matches!(
            parse("4 div 2").unwrap(),
            Expr::Multiplicative(MulOp::Divide, _, _)
        ));
        assert!(matches!(
            parse("div").unwrap(),
            Expr::Path { .. }
        ));
        assert!(matches!(
            parse("and or or").unwrap(),
            Expr::Or(_, _)
        ));
    }

    #[test]
    fn precedence_or_binds_loosest() {
        // a or b and c  ==  a or (b and c)
        match parse("a or b and c").unwrap() {
            Expr::Or(_, rhs) => assert!(matches!(*rhs, Expr::And(_, _))),
            other => panic!("unexpected expr: {other:?}"),
        }
        // 1 + 2 * 3  ==  1 + (2 * 3)
        match parse("1 + 2 * 3").unwrap() {
            Expr::Additive(AddOp::Add, _, rhs) => {
                assert!(matches!(*rhs, Expr::Multiplicative(MulOp::Multiply, _, _)))
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn unary_minus_nests() {
        assert!(matches!(parse("--1").unwrap(), Expr::Negate(_)));
    }

    #[test]
    fn explicit_axes_and_node_types() {
        match parse("ancestor-or-self::node()").unwrap() {
            Expr::Path { steps, .. } => {
                assert_eq!(steps[0].axis, Axis::AncestorOrSelf);
                assert_eq!(steps[0].test, NodeTest::AnyNode);
            }
            other => panic!("unexpected expr: {other:?}"),
        }
        match parse("processing-instruction('php')").unwrap() {
            Expr::Path { steps, .. } => {
                assert_eq!(steps[0].test, NodeTest::Pi(Some("php".into())));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
        assert!(parse("bogus::x").is_err());
        // In step position a parenthesized name must be a node type.
        assert!(parse("a/unknowntype()").is_err());
    }

    #[test]
    fn filter_expressions_take_predicates_and_steps() {
        match parse("(//a)[1]/b").unwrap() {
            Expr::Filter {
                predicates, steps, ..
            } => {
                assert_eq!(predicates.len(), 1);
                assert_eq!(steps.len(), 1);
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn function_calls_parse() {
        match parse("concat('a', 'b', 'c')").unwrap() {
            Expr::Function(name, args) => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected expr: {other:?}"),
        }
        // node type names are steps, not functions
        assert!(matches!(parse("node()").unwrap(), Expr::Path { .. }));
    }

    #[test]
    fn bare_slash_is_the_root() {
        assert_eq!(
            parse("/").unwrap(),
            Expr::Path {
                start: PathStart::Root,
                steps: Vec::new()
            }
        );
    }

    #[test]
    fn empty_and_incomplete_expressions_fail() {
        assert!(parse("").is_err());
        assert!(parse("a/").is_err());
        assert!(parse("a[").is_err());
        assert!(parse("a[]").is_err());
        assert!(parse("f(").is_err());
    }
}
