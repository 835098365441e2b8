//! Evaluator for the formula subset written into report sheets.
//!
//! Supports numbers, A1 references (optionally `$`-anchored), `A1:B9` ranges,
//! `+ - * /`, unary minus, parentheses, `SUM(...)` and `NA()`. Results follow
//! spreadsheet semantics: empty cells read as zero, `SUM` skips text, and
//! failures surface as spreadsheet error values.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use super::{CellValue, ReportSheet};

/// Nested formula references deeper than this are treated as circular
const MAX_DEPTH: usize = 64;

/// Spreadsheet error values
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaError {
    #[error("#DIV/0!")]
    DivByZero,
    #[error("#N/A")]
    NotAvailable,
    #[error("#VALUE!")]
    Value,
    #[error("#REF!")]
    Ref,
    #[error("#NAME?")]
    Name,
}

pub type FormulaResult = std::result::Result<Decimal, FormulaError>;

/// Convert column index to letter (0 = A, 25 = Z, 26 = AA)
pub fn column_letter(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Parse an A1 reference into zero-based (row, col)
pub fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let cleaned: String = reference
        .chars()
        .filter(|c| *c != '$')
        .collect::<String>()
        .to_ascii_uppercase();
    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cleaned.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut col = 0usize;
    for c in letters.chars() {
        col = col.checked_mul(26)?.checked_add((c as u8 - b'A') as usize + 1)?;
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Colon,
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            ':' => tokens.push(Token::Colon),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = Decimal::from_str(&text).map_err(|_| FormulaError::Value)?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '$' || chars[i] == '_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
                continue;
            }
            _ => return Err(FormulaError::Value),
        }
        i += 1;
    }

    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Number(Decimal),
    Ref(usize, usize),
    Range((usize, usize), (usize, usize)),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            _ => Err(FormulaError::Value),
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.call(name.to_ascii_uppercase());
                }
                let start = parse_cell_ref(&name).ok_or(FormulaError::Name)?;
                if self.peek() == Some(&Token::Colon) {
                    self.pos += 1;
                    let end = match self.advance() {
                        Some(Token::Ident(end)) => parse_cell_ref(&end).ok_or(FormulaError::Ref)?,
                        _ => return Err(FormulaError::Value),
                    };
                    return Ok(Expr::Range(start, end));
                }
                Ok(Expr::Ref(start.0, start.1))
            }
            _ => Err(FormulaError::Value),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(Expr::Call(name, args));
        }
        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(Expr::Call(name, args)),
                _ => return Err(FormulaError::Value),
            }
        }
    }
}

fn parse(formula: &str) -> Result<Expr, FormulaError> {
    let body = formula.strip_prefix('=').unwrap_or(formula);
    let mut parser = Parser {
        tokens: tokenize(body)?,
        pos: 0,
    };
    let expr = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(FormulaError::Value);
    }
    Ok(expr)
}

/// Evaluate formula text in the context of `sheet`
pub fn evaluate(sheet: &ReportSheet, formula: &str) -> FormulaResult {
    evaluate_at_depth(sheet, formula, 0)
}

fn evaluate_at_depth(sheet: &ReportSheet, formula: &str, depth: usize) -> FormulaResult {
    if depth > MAX_DEPTH {
        return Err(FormulaError::Ref);
    }
    let expr = parse(formula)?;
    eval(sheet, &expr, depth)
}

/// Value of a single cell used as an operand
fn cell_value(sheet: &ReportSheet, row: usize, col: usize, depth: usize) -> FormulaResult {
    match sheet.cell_at(row, col) {
        None | Some(CellValue::Empty) => Ok(Decimal::ZERO),
        Some(CellValue::Number(n)) => Ok(*n),
        Some(CellValue::Text(s)) => Decimal::from_str(s.trim()).map_err(|_| FormulaError::Value),
        Some(CellValue::Formula(f)) => evaluate_at_depth(sheet, f, depth + 1),
        Some(other) => scalar(other),
    }
}

/// Numeric value of a non-formula cell; booleans count as 1/0, dates as their serial
pub(crate) fn scalar(cell: &CellValue) -> FormulaResult {
    match cell {
        CellValue::Empty => Ok(Decimal::ZERO),
        CellValue::Number(n) => Ok(*n),
        CellValue::Bool(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
        CellValue::DateTime(serial) => Decimal::from_f64(*serial).ok_or(FormulaError::Value),
        CellValue::Text(_) | CellValue::Formula(_) => Err(FormulaError::Value),
    }
}

fn eval(sheet: &ReportSheet, expr: &Expr, depth: usize) -> FormulaResult {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Ref(row, col) => cell_value(sheet, *row, *col, depth),
        Expr::Range(..) => Err(FormulaError::Value),
        Expr::Neg(inner) => Ok(-eval(sheet, inner, depth)?),
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(sheet, lhs, depth)?;
            let b = eval(sheet, rhs, depth)?;
            let result = match op {
                Op::Add => a.checked_add(b),
                Op::Sub => a.checked_sub(b),
                Op::Mul => a.checked_mul(b),
                Op::Div => {
                    if b.is_zero() {
                        return Err(FormulaError::DivByZero);
                    }
                    a.checked_div(b)
                }
            };
            result.ok_or(FormulaError::Value)
        }
        Expr::Call(name, args) => match name.as_str() {
            "SUM" => sum(sheet, args, depth),
            "NA" if args.is_empty() => Err(FormulaError::NotAvailable),
            _ => Err(FormulaError::Name),
        },
    }
}

fn sum(sheet: &ReportSheet, args: &[Expr], depth: usize) -> FormulaResult {
    let mut total = Decimal::ZERO;
    for arg in args {
        let part = match arg {
            Expr::Range(start, end) => {
                let mut subtotal = Decimal::ZERO;
                for row in start.0.min(end.0)..=start.0.max(end.0) {
                    for col in start.1.min(end.1)..=start.1.max(end.1) {
                        let value = match sheet.cell_at(row, col) {
                            Some(CellValue::Number(n)) => *n,
                            Some(cell @ CellValue::DateTime(_)) => scalar(cell)?,
                            Some(CellValue::Formula(f)) => evaluate_at_depth(sheet, f, depth + 1)?,
                            _ => continue,
                        };
                        subtotal = subtotal.checked_add(value).ok_or(FormulaError::Value)?;
                    }
                }
                subtotal
            }
            other => eval(sheet, other, depth)?,
        };
        total = total.checked_add(part).ok_or(FormulaError::Value)?;
    }
    Ok(total)
}
