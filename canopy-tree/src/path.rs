//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

//! Stateless path-expression subset used by `must`/`when` constraints,
//! leafref resolution and the upgrade changelog: location paths with key
//! predicates, `..`, `current()`, comparisons and boolean connectives.
//! Evaluation never mutates the tree; all mutations go through explicit
//! operations on [`ConfigTree`].

use crate::tree::{ConfigTree, NodeId};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(CmpOp, Operand, Operand),
    Path(LocationPath),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Path(LocationPath),
    Literal(String),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub from_current: bool,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    Parent,
    Current,
    Child {
        prefix: Option<String>,
        name: String,
        // `[key='literal']` predicates.
        predicates: Vec<(String, String)>,
    },
}

// ===== parsing =====

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Slash,
    DotDot,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Current,
    Ident(Option<String>, String),
    Literal(String),
    Number(String),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parses a full boolean expression (`must`/`when` bodies).
pub fn parse(input: &str) -> Result<Expr, String> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing input in expression \"{input}\""));
    }
    Ok(expr)
}

/// Parses a bare location path (`where`/`dst`/leafref operands).
pub fn parse_path(input: &str) -> Result<LocationPath, String> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let path = parser.location_path()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing input in path \"{input}\""));
    }
    Ok(path)
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err("expected \"!=\"".to_owned());
                }
                tokens.push(Token::Ne);
            }
            '.' => {
                chars.next();
                if chars.peek() == Some(&'.') {
                    chars.next();
                    tokens.push(Token::DotDot);
                } else {
                    tokens.push(Token::Dot);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => literal.push(c),
                        None => {
                            return Err("unterminated literal".to_owned());
                        }
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            '0'..='9' | '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            c if is_name_start(c) => {
                let mut name = String::new();
                name.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if is_name_char(c) {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut prefix = None;
                if chars.peek() == Some(&':') {
                    chars.next();
                    let mut local = String::new();
                    while let Some(&c) = chars.peek() {
                        if is_name_char(c) {
                            local.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if local.is_empty() {
                        return Err(format!("dangling prefix \"{name}\""));
                    }
                    prefix = Some(name);
                    name = local;
                }
                tokens.push(match (prefix.as_deref(), name.as_str()) {
                    (None, "and") => Token::And,
                    (None, "or") => Token::Or,
                    (None, "not") => Token::Not,
                    (None, "current") => Token::Current,
                    _ => Token::Ident(prefix, name),
                });
            }
            c => return Err(format!("unexpected character '{c}'")),
        }
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.next() {
            Some(ref t) if *t == token => Ok(()),
            other => Err(format!("expected {token:?}, found {other:?}")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.cmp_expr()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.cmp_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            self.expect(Token::LParen)?;
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        let lhs = self.operand()?;
        match self.peek() {
            Some(&Token::Eq) => {
                self.next();
                let rhs = self.operand()?;
                Ok(Expr::Cmp(CmpOp::Eq, lhs, rhs))
            }
            Some(&Token::Ne) => {
                self.next();
                let rhs = self.operand()?;
                Ok(Expr::Cmp(CmpOp::Ne, lhs, rhs))
            }
            _ => match lhs {
                Operand::Path(path) => Ok(Expr::Path(path)),
                Operand::Literal(literal) => {
                    // A bare literal is truthy when non-empty.
                    Ok(Expr::Cmp(
                        CmpOp::Ne,
                        Operand::Literal(literal),
                        Operand::Literal(String::new()),
                    ))
                }
            },
        }
    }

    fn operand(&mut self) -> Result<Operand, String> {
        match self.peek() {
            Some(Token::Literal(_)) => {
                let Some(Token::Literal(literal)) = self.next() else {
                    unreachable!();
                };
                Ok(Operand::Literal(literal))
            }
            Some(Token::Number(_)) => {
                let Some(Token::Number(number)) = self.next() else {
                    unreachable!();
                };
                Ok(Operand::Literal(number))
            }
            _ => Ok(Operand::Path(self.location_path()?)),
        }
    }

    fn location_path(&mut self) -> Result<LocationPath, String> {
        let mut path = LocationPath::default();

        if self.peek() == Some(&Token::Current) {
            self.next();
            self.expect(Token::LParen)?;
            self.expect(Token::RParen)?;
            path.from_current = true;
            if self.peek() != Some(&Token::Slash) {
                return Ok(path);
            }
            self.next();
        } else if self.peek() == Some(&Token::Slash) {
            self.next();
            path.absolute = true;
        }

        loop {
            match self.peek() {
                Some(&Token::DotDot) => {
                    self.next();
                    path.steps.push(Step::Parent);
                }
                Some(&Token::Dot) => {
                    self.next();
                    path.steps.push(Step::Current);
                }
                Some(Token::Ident(..)) => {
                    let Some(Token::Ident(prefix, name)) = self.next() else {
                        unreachable!();
                    };
                    let mut predicates = vec![];
                    while self.peek() == Some(&Token::LBracket) {
                        self.next();
                        let key = match self.next() {
                            Some(Token::Ident(_, key)) => key,
                            other => {
                                return Err(format!(
                                    "expected predicate key, found {other:?}"
                                ));
                            }
                        };
                        self.expect(Token::Eq)?;
                        let value = match self.next() {
                            Some(Token::Literal(value))
                            | Some(Token::Number(value)) => value,
                            other => {
                                return Err(format!(
                                    "expected predicate value, found {other:?}"
                                ));
                            }
                        };
                        self.expect(Token::RBracket)?;
                        predicates.push((key, value));
                    }
                    path.steps.push(Step::Child {
                        prefix,
                        name,
                        predicates,
                    });
                }
                _ => {
                    if path.steps.is_empty() && !path.absolute
                        && !path.from_current
                    {
                        return Err(format!(
                            "expected path, found {:?}",
                            self.peek()
                        ));
                    }
                    break;
                }
            }

            if self.peek() == Some(&Token::Slash) {
                self.next();
            } else {
                break;
            }
        }

        Ok(path)
    }
}

// ===== evaluation =====

/// Selects the nodes matched by a location path, starting from `ctx`
/// (relative paths) or the tree root (absolute paths).
pub fn select(
    tree: &ConfigTree,
    ctx: NodeId,
    path: &LocationPath,
) -> Vec<NodeId> {
    let mut nodes = if path.absolute {
        vec![tree.root()]
    } else {
        vec![ctx]
    };

    for step in &path.steps {
        let mut next = vec![];
        for node in nodes {
            match step {
                Step::Parent => {
                    if let Some(parent) = tree.parent(node) {
                        next.push(parent);
                    }
                }
                Step::Current => next.push(node),
                Step::Child {
                    prefix,
                    name,
                    predicates,
                } => {
                    for child in tree.elements(node) {
                        if tree.name(child) != name {
                            continue;
                        }
                        if let Some(prefix) = prefix
                            && tree.namespace(child) != Some(prefix.as_str())
                        {
                            continue;
                        }
                        let matches =
                            predicates.iter().all(|(key, value)| {
                                tree.find_child(child, key)
                                    .and_then(|leaf| tree.body(leaf))
                                    == Some(value)
                            });
                        if matches {
                            next.push(child);
                        }
                    }
                }
            }
        }
        next.dedup();
        nodes = next;
    }

    nodes
}

/// Evaluates a boolean expression at `ctx`.
pub fn eval_bool(tree: &ConfigTree, ctx: NodeId, expr: &Expr) -> bool {
    match expr {
        Expr::Or(lhs, rhs) => {
            eval_bool(tree, ctx, lhs) || eval_bool(tree, ctx, rhs)
        }
        Expr::And(lhs, rhs) => {
            eval_bool(tree, ctx, lhs) && eval_bool(tree, ctx, rhs)
        }
        Expr::Not(inner) => !eval_bool(tree, ctx, inner),
        Expr::Cmp(op, lhs, rhs) => {
            let lhs = operand_values(tree, ctx, lhs);
            let rhs = operand_values(tree, ctx, rhs);
            // XPath comparison semantics: true if any pair satisfies the
            // operator.
            lhs.iter().any(|l| {
                rhs.iter().any(|r| match op {
                    CmpOp::Eq => values_eq(l, r),
                    CmpOp::Ne => !values_eq(l, r),
                })
            })
        }
        Expr::Path(path) => !select(tree, ctx, path).is_empty(),
    }
}

/// Body values of the nodes selected by a path (leafref resolution).
pub fn values(
    tree: &ConfigTree,
    ctx: NodeId,
    path: &LocationPath,
) -> Vec<String> {
    select(tree, ctx, path)
        .into_iter()
        .filter_map(|node| tree.body(node).map(str::to_owned))
        .collect()
}

fn operand_values(
    tree: &ConfigTree,
    ctx: NodeId,
    operand: &Operand,
) -> Vec<String> {
    match operand {
        Operand::Literal(literal) => vec![literal.clone()],
        Operand::Path(path) => values(tree, ctx, path),
    }
}

fn values_eq(lhs: &str, rhs: &str) -> bool {
    if lhs == rhs {
        return true;
    }
    // Numeric comparison when both sides parse as numbers.
    match (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => false,
    }
}
