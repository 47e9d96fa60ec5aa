//! Row-filter formulas over table branches.
//!
//! Accepts the subset of TTree::Draw selection syntax used by the E/p
//! analysis: arithmetic (`+ - * / %`), comparisons (`== != < <= > >=`),
//! logic (`&& || !` or `and or not`), the constant `pi`, and the functions
//! `abs sqrt log log10 exp pow min max cosh sinh tanh`. Truth values are
//! `1.0`/`0.0`. As in C++, any nonzero value (NaN included) counts as true,
//! and `==`/`!=` compare exactly.

use std::f64::consts::PI;
use std::fmt;

use crate::batch::EventBatch;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Op {
    /// Left binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::And => 2,
            Op::Eq | Op::Ne => 3,
            Op::Lt | Op::Le | Op::Gt | Op::Ge => 4,
            Op::Add | Op::Sub => 5,
            Op::Mul | Op::Div | Op::Rem => 6,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Or => truth(is_true(a) || is_true(b)),
            Op::And => truth(is_true(a) && is_true(b)),
            Op::Eq => truth(a == b),
            Op::Ne => truth(a != b),
            Op::Lt => truth(a < b),
            Op::Le => truth(a <= b),
            Op::Gt => truth(a > b),
            Op::Ge => truth(a >= b),
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
            Op::Rem => a % b,
        }
    }
}

fn truth(c: bool) -> f64 {
    if c { 1.0 } else { 0.0 }
}

fn is_true(v: f64) -> bool {
    v != 0.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Builtin {
    Abs,
    Sqrt,
    Log,
    Log10,
    Exp,
    Pow,
    Min,
    Max,
    Cosh,
    Sinh,
    Tanh,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" | "fabs" => Builtin::Abs,
            "sqrt" => Builtin::Sqrt,
            "log" => Builtin::Log,
            "log10" => Builtin::Log10,
            "exp" => Builtin::Exp,
            "pow" => Builtin::Pow,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "cosh" => Builtin::Cosh,
            "sinh" => Builtin::Sinh,
            "tanh" => Builtin::Tanh,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Builtin::Pow | Builtin::Min | Builtin::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Builtin::Abs => args[0].abs(),
            Builtin::Sqrt => args[0].sqrt(),
            Builtin::Log => args[0].ln(),
            Builtin::Log10 => args[0].log10(),
            Builtin::Exp => args[0].exp(),
            Builtin::Pow => args[0].powf(args[1]),
            Builtin::Min => args[0].min(args[1]),
            Builtin::Max => args[0].max(args[1]),
            Builtin::Cosh => args[0].cosh(),
            Builtin::Sinh => args[0].sinh(),
            Builtin::Tanh => args[0].tanh(),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    Branch(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
    Call(Builtin, Vec<Node>),
}

/// A compiled formula ready for column-wise evaluation.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    root: Node,
    /// Branch names the formula reads, in order of first use.
    pub required_branches: Vec<String>,
}

impl Formula {
    /// Parse and compile `input`.
    pub fn compile(input: &str) -> Result<Self> {
        let tokens = lex(input)?;
        let mut parser = Parser { tokens: &tokens, pos: 0, branches: Vec::new() };
        let root = parser.expression(0)?;
        if let Some(tok) = parser.tokens.get(parser.pos) {
            return Err(StoreError::Expression(format!(
                "unexpected {tok} after end of expression in '{input}'"
            )));
        }
        Ok(Self { source: input.trim().to_string(), root, required_branches: parser.branches })
    }

    /// Compile `input`, treating a blank string as "no formula".
    pub fn compile_optional(input: &str) -> Result<Option<Self>> {
        if input.trim().is_empty() { Ok(None) } else { Self::compile(input).map(Some) }
    }

    /// The expression text this formula was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate over every row of `batch`.
    pub fn eval(&self, batch: &EventBatch) -> Result<Vec<f64>> {
        let columns = self
            .required_branches
            .iter()
            .map(|name| batch.column(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(eval_node(&self.root, &columns, batch.len()))
    }

    /// Evaluate over every row and interpret nonzero values as `true`.
    pub fn eval_mask(&self, batch: &EventBatch) -> Result<Vec<bool>> {
        Ok(self.eval(batch)?.into_iter().map(is_true).collect())
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval_node(node: &Node, columns: &[&[f64]], n_rows: usize) -> Vec<f64> {
    match node {
        Node::Const(v) => vec![*v; n_rows],
        Node::Branch(i) => columns[*i].to_vec(),
        Node::Neg(inner) => eval_node(inner, columns, n_rows).into_iter().map(|v| -v).collect(),
        Node::Not(inner) => {
            eval_node(inner, columns, n_rows).into_iter().map(|v| truth(!is_true(v))).collect()
        }
        Node::Binary(op, lhs, rhs) => {
            let mut out = eval_node(lhs, columns, n_rows);
            let rhs = eval_node(rhs, columns, n_rows);
            for (a, b) in out.iter_mut().zip(rhs) {
                *a = op.apply(*a, b);
            }
            out
        }
        Node::Call(func, args) => {
            let args: Vec<Vec<f64>> = args.iter().map(|a| eval_node(a, columns, n_rows)).collect();
            let mut row = vec![0.0; args.len()];
            (0..n_rows)
                .map(|i| {
                    for (slot, arg) in row.iter_mut().zip(&args) {
                        *slot = arg[i];
                    }
                    func.apply(&row)
                })
                .collect()
        }
    }
}

// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(Op),
    Bang,
    Open,
    Close,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "number {v}"),
            Token::Ident(s) => write!(f, "identifier '{s}'"),
            Token::Op(op) => write!(f, "operator {op:?}"),
            Token::Bang => f.write_str("'!'"),
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let next = bytes.get(i + 1).map(|&b| b as char);
        let (token, width) = match (c, next) {
            (c, _) if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            ('&', Some('&')) => (Token::Op(Op::And), 2),
            ('|', Some('|')) => (Token::Op(Op::Or), 2),
            ('=', Some('=')) => (Token::Op(Op::Eq), 2),
            ('!', Some('=')) => (Token::Op(Op::Ne), 2),
            ('<', Some('=')) => (Token::Op(Op::Le), 2),
            ('>', Some('=')) => (Token::Op(Op::Ge), 2),
            ('<', _) => (Token::Op(Op::Lt), 1),
            ('>', _) => (Token::Op(Op::Gt), 1),
            ('+', _) => (Token::Op(Op::Add), 1),
            ('-', _) => (Token::Op(Op::Sub), 1),
            ('*', _) => (Token::Op(Op::Mul), 1),
            ('/', _) => (Token::Op(Op::Div), 1),
            ('%', _) => (Token::Op(Op::Rem), 1),
            ('!', _) => (Token::Bang, 1),
            ('(', _) => (Token::Open, 1),
            (')', _) => (Token::Close, 1),
            (',', _) => (Token::Comma, 1),
            (c, _) if c.is_ascii_digit() || c == '.' => {
                let len = number_len(&bytes[i..]);
                let text = &input[i..i + len];
                let value = text
                    .parse()
                    .map_err(|_| StoreError::Expression(format!("invalid number '{text}'")))?;
                (Token::Number(value), len)
            }
            (c, _) if c.is_ascii_alphabetic() || c == '_' => {
                let len = bytes[i..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                    .count();
                let word = &input[i..i + len];
                let token = match word {
                    "and" => Token::Op(Op::And),
                    "or" => Token::Op(Op::Or),
                    "not" => Token::Bang,
                    _ => Token::Ident(word.to_string()),
                };
                (token, len)
            }
            (c, _) => {
                return Err(StoreError::Expression(format!(
                    "unexpected character '{c}' at offset {i} in '{input}'"
                )));
            }
        };
        tokens.push(token);
        i += width;
    }
    Ok(tokens)
}

/// Length of the numeric literal at the start of `bytes` (digits, dot, exponent).
fn number_len(bytes: &[u8]) -> usize {
    let mut len = 0;
    while len < bytes.len() {
        let b = bytes[len];
        let exponent_sign =
            (b == b'+' || b == b'-') && len > 0 && matches!(bytes[len - 1], b'e' | b'E');
        if b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || exponent_sign {
            len += 1;
        } else {
            break;
        }
    }
    len
}

// Parser (precedence climbing)

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    branches: Vec<String>,
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += usize::from(tok.is_some());
        tok
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Node> {
        let mut lhs = self.prefix()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if op.precedence() <= min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(op.precedence())?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Node> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Node::Const(v)),
            Some(Token::Op(Op::Sub)) => Ok(Node::Neg(Box::new(self.unary_operand()?))),
            Some(Token::Op(Op::Add)) => self.unary_operand(),
            Some(Token::Bang) => Ok(Node::Not(Box::new(self.unary_operand()?))),
            Some(Token::Open) => {
                let inner = self.expression(0)?;
                self.expect_close()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::Open)) {
                    self.pos += 1;
                    self.call(&name)
                } else if name == "pi" {
                    Ok(Node::Const(PI))
                } else {
                    Ok(Node::Branch(self.branch_index(name)))
                }
            }
            Some(tok) => Err(StoreError::Expression(format!("unexpected {tok}"))),
            None => Err(StoreError::Expression("unexpected end of expression".into())),
        }
    }

    /// Operand of a unary operator: binds tighter than any binary operator.
    fn unary_operand(&mut self) -> Result<Node> {
        self.expression(Op::Mul.precedence())
    }

    fn call(&mut self, name: &str) -> Result<Node> {
        let func = Builtin::lookup(name)
            .ok_or_else(|| StoreError::Expression(format!("unknown function '{name}'")))?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::Close)) {
            args.push(self.expression(0)?);
            while matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
                args.push(self.expression(0)?);
            }
        }
        self.expect_close()?;
        if args.len() != func.arity() {
            return Err(StoreError::Expression(format!(
                "{name}() takes {} argument(s), got {}",
                func.arity(),
                args.len()
            )));
        }
        Ok(Node::Call(func, args))
    }

    fn expect_close(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::Close) => Ok(()),
            Some(tok) => Err(StoreError::Expression(format!("expected ')', got {tok}"))),
            None => Err(StoreError::Expression("missing ')'".into())),
        }
    }

    fn branch_index(&mut self, name: String) -> usize {
        match self.branches.iter().position(|b| *b == name) {
            Some(i) => i,
            None => {
                self.branches.push(name);
                self.branches.len() - 1
            }
        }
    }
}
