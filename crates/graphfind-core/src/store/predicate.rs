//! Where-clause parser and evaluator for the in-memory store.
//!
//! Supports the SQL subset produced by [`crate::expression`] plus what layer
//! definition expressions typically use:
//!
//! ```text
//! expr     := or
//! or       := and ( OR and )*
//! and      := unary ( AND unary )*
//! unary    := NOT unary | primary
//! primary  := '(' expr ')'
//!           | operand ( cmp operand | [NOT] LIKE operand | IS [NOT] NULL )
//! operand  := UPPER '(' operand ')' | LOWER '(' operand ')'
//!           | ident | 'string' | number | NULL
//! cmp      := = | <> | != | < | <= | > | >=
//! ```
//!
//! Evaluation uses SQL three-valued logic: comparisons against `NULL` are
//! unknown, and a row matches only when the whole clause is true. `LIKE`
//! is ASCII case-insensitive, as in SQLite.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::{bail, Result};

/// An attribute value held by the in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Double(f64),
    Text(String),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl Value {
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Double(d) => Some(d.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Text(String),
    Number(f64),
    Null,
    Upper(Box<Operand>),
    Lower(Box<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    Like {
        operand: Operand,
        pattern: Operand,
        negated: bool,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    Op(CmpOp),
    And,
    Or,
    Not,
    Like,
    Is,
    Null,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('>') => {
                    tokens.push(Token::Op(CmpOp::Ne));
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            '\'' => {
                // '' inside a literal is an escaped quote
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => bail!("unterminated string literal in: {}", input),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '"' => {
                i += 1;
                let mut name = String::new();
                loop {
                    match chars.get(i) {
                        None => bail!("unterminated identifier in: {}", input),
                        Some('"') if chars.get(i + 1) == Some(&'"') => {
                            name.push('"');
                            i += 2;
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            name.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Ident(name));
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid number '{}' in: {}", text, input))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "LIKE" => Token::Like,
                    "IS" => Token::Is,
                    "NULL" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            other => bail!("unexpected character '{}' in: {}", other, input),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if !self.eat(token) {
            bail!("expected {:?} at token {} in: {}", token, self.pos, self.source);
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        match self.next() {
            Some(Token::Op(op)) => Ok(Expr::Compare {
                left,
                op,
                right: self.parse_operand()?,
            }),
            Some(Token::Like) => Ok(Expr::Like {
                operand: left,
                pattern: self.parse_operand()?,
                negated: false,
            }),
            Some(Token::Not) => {
                self.expect(&Token::Like)?;
                Ok(Expr::Like {
                    operand: left,
                    pattern: self.parse_operand()?,
                    negated: true,
                })
            }
            Some(Token::Is) => {
                let negated = self.eat(&Token::Not);
                self.expect(&Token::Null)?;
                Ok(Expr::IsNull {
                    operand: left,
                    negated,
                })
            }
            other => bail!("expected comparison, found {:?} in: {}", other, self.source),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Operand::Text(s)),
            Some(Token::Num(n)) => Ok(Operand::Number(n)),
            Some(Token::Null) => Ok(Operand::Null),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let inner = self.parse_operand()?;
                    self.expect(&Token::RParen)?;
                    return match name.to_ascii_uppercase().as_str() {
                        "UPPER" => Ok(Operand::Upper(Box::new(inner))),
                        "LOWER" => Ok(Operand::Lower(Box::new(inner))),
                        _ => bail!("unsupported function '{}' in: {}", name, self.source),
                    };
                }
                Ok(Operand::Field(name))
            }
            other => bail!("expected operand, found {:?} in: {}", other, self.source),
        }
    }
}

/// Parses a where clause into an expression tree.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        bail!("empty where clause");
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: input,
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        bail!(
            "unexpected trailing input at token {} in: {}",
            parser.pos,
            input
        );
    }
    Ok(expr)
}

impl Operand {
    fn collect_fields<'e>(&'e self, out: &mut Vec<&'e str>) {
        match self {
            Operand::Field(f) => out.push(f),
            Operand::Upper(inner) | Operand::Lower(inner) => inner.collect_fields(out),
            _ => {}
        }
    }

    fn eval(&self, row: &HashMap<String, Value>) -> Value {
        match self {
            Operand::Field(f) => row
                .get(&f.to_ascii_uppercase())
                .cloned()
                .unwrap_or(Value::Null),
            Operand::Text(s) => Value::Text(s.clone()),
            Operand::Number(n) => Value::Double(*n),
            Operand::Null => Value::Null,
            Operand::Upper(inner) => match inner.eval(row).as_text() {
                Some(s) => Value::Text(s.to_ascii_uppercase()),
                None => Value::Null,
            },
            Operand::Lower(inner) => match inner.eval(row).as_text() {
                Some(s) => Value::Text(s.to_ascii_lowercase()),
                None => Value::Null,
            },
        }
    }
}

impl Expr {
    /// Field names referenced anywhere in the expression.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'e>(&'e self, out: &mut Vec<&'e str>) {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Expr::Not(e) => e.collect_fields(out),
            Expr::Compare { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Expr::Like {
                operand, pattern, ..
            } => {
                operand.collect_fields(out);
                pattern.collect_fields(out);
            }
            Expr::IsNull { operand, .. } => operand.collect_fields(out),
        }
    }

    /// True when the row satisfies the expression. Attribute keys must be
    /// upper-case field names.
    pub fn matches(&self, row: &HashMap<String, Value>) -> bool {
        self.eval(row) == Some(true)
    }

    fn eval(&self, row: &HashMap<String, Value>) -> Option<bool> {
        match self {
            Expr::And(a, b) => match (a.eval(row), b.eval(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Expr::Or(a, b) => match (a.eval(row), b.eval(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Expr::Not(e) => e.eval(row).map(|b| !b),
            Expr::Compare { left, op, right } => {
                let ordering = compare(&left.eval(row), &right.eval(row))?;
                Some(match op {
                    CmpOp::Eq => ordering == Ordering::Equal,
                    CmpOp::Ne => ordering != Ordering::Equal,
                    CmpOp::Lt => ordering == Ordering::Less,
                    CmpOp::Le => ordering != Ordering::Greater,
                    CmpOp::Gt => ordering == Ordering::Greater,
                    CmpOp::Ge => ordering != Ordering::Less,
                })
            }
            Expr::Like {
                operand,
                pattern,
                negated,
            } => {
                let text = operand.eval(row).as_text()?;
                let pattern = pattern.eval(row).as_text()?;
                Some(like(&text, &pattern) != *negated)
            }
            Expr::IsNull { operand, negated } => {
                Some((operand.eval(row) == Value::Null) != *negated)
            }
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if *a == Value::Null || *b == Value::Null {
        return None;
    }
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        // Text against a number compares numerically when the text parses.
        (Value::Text(t), n) | (n, Value::Text(t)) => {
            let parsed: f64 = t.trim().parse().ok()?;
            let num = n.as_number()?;
            let ord = parsed.partial_cmp(&num)?;
            if matches!(a, Value::Text(_)) {
                Some(ord)
            } else {
                Some(ord.reverse())
            }
        }
        _ => None,
    }
}

/// SQL `LIKE` with `%` and `_`, ASCII case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().map(|c| c.to_ascii_uppercase()).collect();
    let p: Vec<char> = pattern.chars().map(|c| c.to_ascii_uppercase()).collect();

    // dp[j]: pattern[..j] matches text[..i]
    let mut dp = vec![false; p.len() + 1];
    dp[0] = true;
    for j in 1..=p.len() {
        dp[j] = dp[j - 1] && p[j - 1] == '%';
    }
    for &tc in &t {
        let mut prev_diag = dp[0];
        dp[0] = false;
        for j in 1..=p.len() {
            let prev_row = dp[j];
            dp[j] = match p[j - 1] {
                '%' => dp[j - 1] || prev_row,
                '_' => prev_diag,
                pc => prev_diag && pc == tc,
            };
            prev_diag = prev_row;
        }
    }
    dp[p.len()]
}
