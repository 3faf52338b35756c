//! Expression lexer and recursive-descent parser.
//!
//! Grammar (lowest precedence first):
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | compare
//! compare := operand (op operand)?
//! operand := literal | path | "(" or ")"
//! path    := "#"? ident ("." ident | "[" (int | string) "]")*
//! ```

use serde_json::{Number, Value};

use super::ExpressionError;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path { variable: String, segments: Vec<Segment> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Hash,
    Dot,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Bang,
    AndAnd,
    OrOr,
    Op(CompareOp),
    End,
}

fn syntax(offset: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' | ')' | '[' | ']' | '.' | '#' | '-' => {
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '.' => Token::Dot,
                    '#' => Token::Hash,
                    _ => Token::Minus,
                };
                tokens.push((offset, token));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((offset, Token::AndAnd));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((offset, Token::OrOr));
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push((offset, Token::Op(CompareOp::Eq)));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((offset, Token::Op(CompareOp::Ne)));
                i += 2;
            }
            '!' => {
                tokens.push((offset, Token::Bang));
                i += 1;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => CompareOp::Le,
                    ('<', false) => CompareOp::Lt,
                    (_, true) => CompareOp::Ge,
                    (_, false) => CompareOp::Gt,
                };
                tokens.push((offset, Token::Op(op)));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax(offset, "unterminated string literal")),
                        Some((_, '\\')) => {
                            match chars.get(i + 1) {
                                Some((_, escaped)) => value.push(*escaped),
                                None => return Err(syntax(offset, "unterminated string literal")),
                            }
                            i += 2;
                        }
                        Some((_, ch)) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some((_, ch)) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((offset, Token::Str(value)));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                tokens.push((offset, Token::Num(parse_number(offset, &text)?)));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let token = match ident.as_str() {
                    "and" => Token::AndAnd,
                    "or" => Token::OrOr,
                    "not" => Token::Bang,
                    "eq" => Token::Op(CompareOp::Eq),
                    "ne" => Token::Op(CompareOp::Ne),
                    "lt" => Token::Op(CompareOp::Lt),
                    "le" => Token::Op(CompareOp::Le),
                    "gt" => Token::Op(CompareOp::Gt),
                    "ge" => Token::Op(CompareOp::Ge),
                    _ => Token::Ident(ident),
                };
                tokens.push((offset, token));
            }
            other => return Err(syntax(offset, format!("unexpected character `{other}`"))),
        }
    }

    tokens.push((input.len(), Token::End));
    Ok(tokens)
}

fn parse_number(offset: usize, text: &str) -> Result<Number, ExpressionError> {
    if let Ok(int) = text.parse::<i64>() {
        return Ok(Number::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| syntax(offset, format!("invalid number `{text}`")))
}

/// Parse an expression string into a tree.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::End => Ok(expr),
        _ => Err(syntax(parser.offset(), "unexpected trailing input")),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with `End`, and `advance` never moves past it.
        &self.tokens[self.pos].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].1.clone();
        if token != Token::End {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExpressionError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(syntax(self.offset(), format!("expected {what}")))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while *self.peek() == Token::AndAnd {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if *self.peek() == Token::Bang {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_operand()?;
        if let Token::Op(op) = *self.peek() {
            self.advance();
            let right = self.parse_operand()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Num(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Minus => match self.advance() {
                Token::Num(n) => Ok(Expr::Literal(Value::Number(negate(offset, &n)?))),
                _ => Err(syntax(offset, "expected a number after `-`")),
            },
            Token::Hash => match self.advance() {
                Token::Ident(name) => self.parse_path(name),
                _ => Err(syntax(offset, "expected a variable name after `#`")),
            },
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.parse_path(name),
            },
            Token::End => Err(syntax(offset, "unexpected end of expression")),
            other => Err(syntax(offset, format!("unexpected token {other:?}"))),
        }
    }

    fn parse_path(&mut self, variable: String) -> Result<Expr, ExpressionError> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let offset = self.offset();
                    match self.advance() {
                        Token::Ident(key) => segments.push(Segment::Key(key)),
                        _ => return Err(syntax(offset, "expected a field name after `.`")),
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let offset = self.offset();
                    let segment = match self.advance() {
                        Token::Str(key) => Segment::Key(key),
                        Token::Num(n) => match n.as_u64() {
                            Some(index) => Segment::Index(index as usize),
                            None => {
                                return Err(syntax(offset, "index must be a non-negative integer"))
                            }
                        },
                        _ => return Err(syntax(offset, "expected an index or a quoted key")),
                    };
                    self.expect(Token::RBracket, "`]`")?;
                    segments.push(segment);
                }
                _ => break,
            }
        }
        Ok(Expr::Path { variable, segments })
    }
}

fn negate(offset: usize, n: &Number) -> Result<Number, ExpressionError> {
    if let Some(int) = n.as_i64() {
        return Ok(Number::from(-int));
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .ok_or_else(|| syntax(offset, "invalid number"))
}
