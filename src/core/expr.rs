//! The scripting language behind `eval`, `given` and `unless`.
//!
//! A deliberately small, Python-flavoured language: assignments, `print`,
//! and expressions over [`Value`]s. Nothing here can import code or touch
//! the filesystem beyond the read-only builtins and `output()`.

use super::types::{Scope, Value};
use std::fmt;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct ExprError {
    pub message: String,
}

impl ExprError {
    fn new(message: impl Into<String>) -> Self {
        ExprError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

type ExprResult<T> = Result<T, ExprError>;

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Str(String),
    Ident(String),
    Op(&'static str),
    Sep,
    End,
}

static END: Tok = Tok::End;

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "<", ">", "=", "+", "-", "*", "/", "%", "(", ")", "[", "]", ",",
];

fn tokenize(src: &str) -> ExprResult<Vec<Tok>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '\n' | ';' => {
                if depth == 0 {
                    tokens.push(Tok::Sep);
                }
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\'' | '"' => {
                let (s, next) = lex_string(&chars, i)?;
                tokens.push(Tok::Str(s));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let n = digits
                    .parse()
                    .map_err(|_| ExprError::new(format!("integer out of range: {}", digits)))?;
                tokens.push(Tok::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| ExprError::new(format!("unexpected character {:?}", c)))?;
                match *op {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth = depth.saturating_sub(1),
                    _ => {}
                }
                tokens.push(Tok::Op(*op));
                i += op.len();
            }
        }
    }
    tokens.push(Tok::End);
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> ExprResult<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\n' {
            break;
        }
        if c == '\\' && i + 1 < chars.len() {
            i += 1;
            match chars[i] {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' => out.push(chars[i]),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    Err(ExprError::new("unterminated string literal"))
}

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Name(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone)]
enum Stmt {
    Assign(String, Expr),
    Print(Vec<Expr>),
    Expr(Expr),
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).unwrap_or(&END)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens.get(self.pos + offset).unwrap_or(&END)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Tok::Op(o) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Tok::Ident(w) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> ExprResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(ExprError::new(format!(
                "expected '{}' but found {}",
                op,
                describe(self.peek())
            )))
        }
    }

    fn program(&mut self) -> ExprResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while *self.peek() == Tok::Sep {
                self.advance();
            }
            if *self.peek() == Tok::End {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
            match self.peek() {
                Tok::Sep | Tok::End => {}
                other => {
                    return Err(ExprError::new(format!(
                        "unexpected {} after statement",
                        describe(other)
                    )))
                }
            }
        }
    }

    fn statement(&mut self) -> ExprResult<Stmt> {
        if let Tok::Ident(name) = self.peek().clone() {
            if name == "print" {
                self.advance();
                return self.print_args().map(Stmt::Print);
            }
            if matches!(self.peek_at(1), Tok::Op("=")) {
                self.pos += 2;
                if name.starts_with("__") {
                    return Err(ExprError::new(format!("cannot assign to reserved name '{}'", name)));
                }
                return Ok(Stmt::Assign(name, self.expr()?));
            }
        }
        self.expr().map(Stmt::Expr)
    }

    fn print_args(&mut self) -> ExprResult<Vec<Expr>> {
        if matches!(self.peek(), Tok::Sep | Tok::End) {
            return Ok(Vec::new());
        }
        if self.eat_op("(") {
            let args = self.arguments(")")?;
            return Ok(args);
        }
        let mut args = vec![self.expr()?];
        while self.eat_op(",") {
            args.push(self.expr()?);
        }
        Ok(args)
    }

    fn arguments(&mut self, close: &str) -> ExprResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat_op(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat_op(close) {
                return Ok(args);
            }
            self.expect_op(",")?;
            if self.eat_op(close) {
                return Ok(args);
            }
        }
    }

    fn expr(&mut self) -> ExprResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ExprResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not_expr()?));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> ExprResult<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ExprResult<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Tok::Op("==") => BinOp::Eq,
            Tok::Op("!=") => BinOp::Ne,
            Tok::Op("<") => BinOp::Lt,
            Tok::Op(">") => BinOp::Gt,
            Tok::Op("<=") => BinOp::Le,
            Tok::Op(">=") => BinOp::Ge,
            Tok::Ident(w) if w == "in" => BinOp::In,
            Tok::Ident(w) if w == "not" && matches!(self.peek_at(1), Tok::Ident(n) if n == "in") => {
                BinOp::NotIn
            }
            _ => return Ok(left),
        };
        if op == BinOp::NotIn {
            self.advance();
        }
        self.advance();
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> ExprResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> ExprResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ExprResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_op("[") {
                let index = self.expr()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if matches!(self.peek(), Tok::Op("(")) {
                let Expr::Name(name) = expr else {
                    return Err(ExprError::new("only named functions can be called"));
                };
                self.advance();
                expr = Expr::Call(name, self.arguments(")")?);
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        match self.advance() {
            Tok::Int(n) => Ok(Expr::Lit(Value::Int(n))),
            Tok::Str(s) => Ok(Expr::Lit(Value::Str(s))),
            Tok::Ident(w) => Ok(match w.as_str() {
                "True" | "true" => Expr::Lit(Value::Bool(true)),
                "False" | "false" => Expr::Lit(Value::Bool(false)),
                _ => Expr::Name(w),
            }),
            Tok::Op("(") => {
                let inner = self.expr()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Tok::Op("[") => Ok(Expr::List(self.arguments("]")?)),
            other => Err(ExprError::new(format!(
                "unexpected {} in expression",
                describe(&other)
            ))),
        }
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Int(n) => format!("number {}", n),
        Tok::Str(s) => format!("string {:?}", s),
        Tok::Ident(w) => format!("name '{}'", w),
        Tok::Op(op) => format!("'{}'", op),
        Tok::Sep => "end of statement".to_string(),
        Tok::End => "end of input".to_string(),
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval(expr: &Expr, scope: &Scope) -> ExprResult<Value> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Name(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::new(format!("name '{}' is not defined", name))),
        Expr::List(items) => items
            .iter()
            .map(|e| eval(e, scope))
            .collect::<ExprResult<Vec<_>>>()
            .map(Value::Seq),
        Expr::Neg(inner) => match eval(inner, scope)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ExprError::new("integer overflow")),
            Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
            other => Err(ExprError::new(format!("cannot negate a {}", other.kind()))),
        },
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.is_truthy())),
        Expr::And(left, right) => {
            let l = eval(left, scope)?;
            if l.is_truthy() {
                eval(right, scope)
            } else {
                Ok(l)
            }
        }
        Expr::Or(left, right) => {
            let l = eval(left, scope)?;
            if l.is_truthy() {
                Ok(l)
            } else {
                eval(right, scope)
            }
        }
        Expr::Binary(op, left, right) => binary(*op, eval(left, scope)?, eval(right, scope)?),
        Expr::Index(target, index) => subscript(eval(target, scope)?, eval(index, scope)?),
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<ExprResult<Vec<_>>>()?;
            call(name, values)
        }
    }
}

fn as_number(v: &Value) -> Option<i64> {
    match v {
        Value::Int(n) => Some(*n),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> ExprResult<Value> {
    let mismatch = |sym: &str, l: &Value, r: &Value| {
        ExprError::new(format!(
            "unsupported operand types for {}: {} and {}",
            sym,
            l.kind(),
            r.kind()
        ))
    };
    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::In | BinOp::NotIn => {
            let found = contains(&r, &l)?;
            Ok(Value::Bool(if op == BinOp::In { found } else { !found }))
        }
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => match (as_number(&l), as_number(&r)) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => return Err(mismatch("comparison", &l, &r)),
                },
            };
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        BinOp::Add => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::Seq(mut a), Value::Seq(b)) => {
                a.extend(b);
                Ok(Value::Seq(a))
            }
            (l, r) => match (as_number(&l), as_number(&r)) {
                (Some(a), Some(b)) => a
                    .checked_add(b)
                    .map(Value::Int)
                    .ok_or_else(|| ExprError::new("integer overflow")),
                _ => Err(mismatch("+", &l, &r)),
            },
        },
        BinOp::Mul => match (&l, &r) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => repeat(s, *n),
            _ => arithmetic("*", &l, &r, i64::checked_mul),
        },
        BinOp::Sub => arithmetic("-", &l, &r, i64::checked_sub),
        BinOp::Div => arithmetic("/", &l, &r, floor_div),
        BinOp::Mod => arithmetic("%", &l, &r, floor_mod),
    }
}

/// Longest string `*` may build.
const MAX_REPEAT_LEN: usize = 1 << 24;

fn repeat(s: &str, n: i64) -> ExprResult<Value> {
    let count = usize::try_from(n.max(0)).unwrap_or(usize::MAX);
    match s.len().checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(Value::Str(s.repeat(count))),
        _ => Err(ExprError::new(format!(
            "string repetition longer than {} bytes",
            MAX_REPEAT_LEN
        ))),
    }
}

/// Quotient rounded toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div_euclid(b)?;
    if b < 0 && a.checked_rem_euclid(b)? != 0 {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder with the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    if b == -1 {
        return Some(0);
    }
    let r = a.checked_rem_euclid(b)?;
    Some(if b < 0 && r != 0 { r + b } else { r })
}

fn arithmetic(
    sym: &str,
    l: &Value,
    r: &Value,
    f: impl Fn(i64, i64) -> Option<i64>,
) -> ExprResult<Value> {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) => f(a, b).map(Value::Int).ok_or_else(|| {
            if b == 0 && (sym == "/" || sym == "%") {
                ExprError::new("division by zero")
            } else {
                ExprError::new("integer overflow")
            }
        }),
        _ => Err(ExprError::new(format!(
            "unsupported operand types for {}: {} and {}",
            sym,
            l.kind(),
            r.kind()
        ))),
    }
}

fn contains(container: &Value, item: &Value) -> ExprResult<bool> {
    match (container, item) {
        (Value::Str(hay), Value::Str(needle)) => Ok(hay.contains(needle.as_str())),
        (Value::Seq(items), _) => Ok(items.iter().any(|i| values_equal(i, item))),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        _ => Err(ExprError::new(format!(
            "'in' needs a string, list or mapping on the right, got a {}",
            container.kind()
        ))),
    }
}

fn subscript(target: Value, index: Value) -> ExprResult<Value> {
    let position = |len: usize, i: i64| -> ExprResult<usize> {
        let resolved = if i < 0 { len as i64 + i } else { i };
        if resolved < 0 || resolved >= len as i64 {
            Err(ExprError::new(format!("index {} out of range", i)))
        } else {
            Ok(resolved as usize)
        }
    };
    match (&target, &index) {
        (Value::Seq(items), Value::Int(i)) => Ok(items[position(items.len(), *i)?].clone()),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[position(chars.len(), *i)?].to_string()))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ExprError::new(format!("key {:?} not found", key))),
        _ => Err(ExprError::new(format!(
            "cannot index a {} with a {}",
            target.kind(),
            index.kind()
        ))),
    }
}

fn call(name: &str, args: Vec<Value>) -> ExprResult<Value> {
    let arity = |n: usize| -> ExprResult<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(ExprError::new(format!(
                "{}() takes {} argument(s), {} given",
                name,
                n,
                args.len()
            )))
        }
    };
    let text = |v: &Value| -> String { v.to_string() };

    match name {
        "exists" => {
            arity(1)?;
            Ok(Value::Bool(std::path::Path::new(&text(&args[0])).exists()))
        }
        "isfile" => {
            arity(1)?;
            Ok(Value::Bool(std::path::Path::new(&text(&args[0])).is_file()))
        }
        "isdir" => {
            arity(1)?;
            Ok(Value::Bool(std::path::Path::new(&text(&args[0])).is_dir()))
        }
        "env" => {
            if args.is_empty() || args.len() > 2 {
                return Err(ExprError::new("env() takes 1 or 2 arguments"));
            }
            let fallback = args.get(1).map(text).unwrap_or_default();
            Ok(Value::Str(std::env::var(text(&args[0])).unwrap_or(fallback)))
        }
        "len" => {
            arity(1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::Seq(items) => items.len(),
                Value::Map(map) => map.len(),
                other => return Err(ExprError::new(format!("a {} has no len()", other.kind()))),
            };
            Ok(Value::Int(n as i64))
        }
        "str" => {
            arity(1)?;
            Ok(Value::Str(text(&args[0])))
        }
        "int" => {
            arity(1)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    ExprError::new(format!("invalid literal for int(): {:?}", s))
                }),
                other => Err(ExprError::new(format!("cannot convert a {} to int", other.kind()))),
            }
        }
        "output" => {
            arity(1)?;
            let out = crate::transport::capture(&text(&args[0])).map_err(ExprError::new)?;
            if !out.success() {
                let mut message = format!(
                    "output({:?}) exited with code {}",
                    text(&args[0]),
                    out.exit_code
                );
                let stderr = out.stderr.trim();
                if !stderr.is_empty() {
                    message.push_str(&format!(": {}", stderr));
                }
                return Err(ExprError::new(message));
            }
            Ok(Value::Str(out.stdout.trim().to_string()))
        }
        other => Err(ExprError::new(format!("unknown function '{}'", other))),
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Evaluate a single expression against `scope`.
pub fn eval_expr(src: &str, scope: &Scope) -> ExprResult<Value> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    while *parser.peek() == Tok::Sep {
        parser.advance();
    }
    let expr = parser.expr()?;
    while *parser.peek() == Tok::Sep {
        parser.advance();
    }
    if *parser.peek() != Tok::End {
        return Err(ExprError::new(format!(
            "unexpected {} after expression",
            describe(parser.peek())
        )));
    }
    eval(&expr, scope)
}

/// Run a program, binding assignments into `scope` and writing `print`
/// output to `out`. The whole program is parsed before anything runs.
pub fn exec(src: &str, scope: &mut Scope, out: &mut impl Write) -> ExprResult<()> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    for stmt in parser.program()? {
        match stmt {
            Stmt::Assign(name, expr) => {
                let value = eval(&expr, scope)?;
                scope.insert(name, value);
            }
            Stmt::Print(args) => {
                let parts = args
                    .iter()
                    .map(|a| eval(a, scope).map(|v| v.to_string()))
                    .collect::<ExprResult<Vec<_>>>()?;
                writeln!(out, "{}", parts.join(" "))
                    .map_err(|e| ExprError::new(format!("print failed: {}", e)))?;
            }
            Stmt::Expr(expr) => {
                eval(&expr, scope)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scope() -> Scope {
        let mut s = Scope::new();
        s.insert("name".to_string(), Value::str("vellum"));
        s.insert("n".to_string(), Value::Int(7));
        s.insert(
            "files".to_string(),
            Value::Seq(vec![Value::str("a.c"), Value::str("b.c")]),
        );
        s
    }

    fn ev(src: &str) -> Value {
        eval_expr(src, &scope()).unwrap()
    }

    #[test]
    fn test_expr_literals() {
        assert_eq!(ev("True"), Value::Bool(true));
        assert_eq!(ev("false"), Value::Bool(false));
        assert_eq!(ev("42"), Value::Int(42));
        assert_eq!(ev("'hi'"), Value::str("hi"));
        assert_eq!(ev("[1, 'a']"), Value::Seq(vec![Value::Int(1), Value::str("a")]));
        assert_eq!(ev("[]"), Value::Seq(vec![]));
    }

    #[test]
    fn test_expr_arithmetic_precedence() {
        assert_eq!(ev("1 + 2 * 3"), Value::Int(7));
        assert_eq!(ev("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(ev("-n + 10"), Value::Int(3));
        assert_eq!(ev("7 / 2"), Value::Int(3));
        assert_eq!(ev("-7 / 2"), Value::Int(-4));
        assert_eq!(ev("-7 % 3"), Value::Int(2));
        assert_eq!(ev("'ab' * 2"), Value::str("abab"));
        assert_eq!(ev("name + '!'"), Value::str("vellum!"));
    }

    #[test]
    fn test_expr_comparisons_and_logic() {
        assert_eq!(ev("n > 5 and n < 10"), Value::Bool(true));
        assert_eq!(ev("n == 7 or missing"), Value::Bool(true));
        assert_eq!(ev("not n"), Value::Bool(false));
        assert_eq!(ev("'a.c' in files"), Value::Bool(true));
        assert_eq!(ev("'z.c' not in files"), Value::Bool(true));
        assert_eq!(ev("'ell' in name"), Value::Bool(true));
        assert_eq!(ev("True == 1"), Value::Bool(true));
        assert_eq!(ev("0 or 'fallback'"), Value::str("fallback"));
    }

    #[test]
    fn test_expr_indexing_and_builtins() {
        assert_eq!(ev("files[0]"), Value::str("a.c"));
        assert_eq!(ev("files[-1]"), Value::str("b.c"));
        assert_eq!(ev("name[0]"), Value::str("v"));
        assert_eq!(ev("len(files)"), Value::Int(2));
        assert_eq!(ev("str(n) + 'x'"), Value::str("7x"));
        assert_eq!(ev("int('12') + 1"), Value::Int(13));
        assert_eq!(ev("output('echo  hi ')"), Value::str("hi"));
        assert_eq!(ev("env('VELLUM_SURELY_UNSET_VAR', 'dflt')"), Value::str("dflt"));
    }

    #[test]
    fn test_expr_filesystem_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        let mut s = Scope::new();
        s.insert("d".to_string(), Value::str(dir.path().to_string_lossy()));
        s.insert("f".to_string(), Value::str(file.to_string_lossy()));
        assert_eq!(eval_expr("isdir(d) and isfile(f)", &s).unwrap(), Value::Bool(true));
        assert_eq!(eval_expr("isfile(d)", &s).unwrap(), Value::Bool(false));
        assert_eq!(eval_expr("exists(f + '.nope')", &s).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_expr_extreme_integers_are_errors() {
        let s = scope();
        let min = "(-9223372036854775807 - 1)";
        assert_eq!(
            eval_expr("5 % 9223372036854775807", &s).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            eval_expr("-5 % 9223372036854775807", &s).unwrap(),
            Value::Int(9223372036854775802)
        );
        assert_eq!(
            eval_expr(&format!("{} % -1", min), &s).unwrap(),
            Value::Int(0)
        );
        assert_eq!(eval_expr("7 % -2", &s).unwrap(), Value::Int(-1));
        assert_eq!(eval_expr("7 / -2", &s).unwrap(), Value::Int(-4));
        for src in [
            format!("{} / -1", min),
            format!("-{}", min),
            "'ab' * 9223372036854775807".to_string(),
            "9223372036854775807 * 'ab'".to_string(),
        ] {
            let err = eval_expr(&src, &s).unwrap_err();
            assert!(!err.message.is_empty(), "{}", src);
        }
        assert_eq!(eval_expr("'ab' * 3", &s).unwrap(), Value::str("ababab"));
        assert_eq!(eval_expr("'ab' * -3", &s).unwrap(), Value::str(""));
    }

    #[test]
    fn test_expr_errors() {
        assert!(eval_expr("undefined_name", &scope()).is_err());
        assert!(eval_expr("1 / 0", &scope()).is_err());
        assert!(eval_expr("1 +", &scope()).is_err());
        assert!(eval_expr("files[9]", &scope()).is_err());
        assert!(eval_expr("nosuch(1)", &scope()).is_err());
        assert!(eval_expr("'a' - 1", &scope()).is_err());
        assert!(eval_expr("1 2", &scope()).is_err());
        assert!(eval_expr("output('exit 4')", &scope()).is_err());
        let err = eval_expr("output('echo broken >&2; exit 2')", &scope()).unwrap_err();
        assert!(err.message.ends_with("exited with code 2: broken"), "{}", err.message);
    }

    #[test]
    fn test_expr_exec_statements() {
        let mut s = scope();
        let mut out = Vec::new();
        exec("x = n * 2\nprint 'x is', x; print(name)", &mut s, &mut out).unwrap();
        assert_eq!(s["x"], Value::Int(14));
        assert_eq!(String::from_utf8(out).unwrap(), "x is 14\nvellum\n");
    }

    #[test]
    fn test_expr_exec_comments_and_blank_lines() {
        let mut s = Scope::new();
        let mut out = Vec::new();
        exec("\n# setup\n\ny = 1  # trailing\n\n", &mut s, &mut out).unwrap();
        assert_eq!(s["y"], Value::Int(1));
        assert!(out.is_empty());
    }

    #[test]
    fn test_expr_exec_rejects_reserved_assignment() {
        let mut s = Scope::new();
        let err = exec("__target__ = 'x'", &mut s, &mut std::io::sink()).unwrap_err();
        assert!(err.message.contains("reserved"));
        assert!(s.is_empty());
    }

    #[test]
    fn test_expr_exec_parses_before_running() {
        let mut s = Scope::new();
        let mut out = Vec::new();
        assert!(exec("print 'first'\n1 +", &mut s, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_expr_multiline_list() {
        let mut s = Scope::new();
        exec("xs = [1,\n 2,\n 3]", &mut s, &mut std::io::sink()).unwrap();
        assert_eq!(s["xs"].as_seq().unwrap().len(), 3);
    }

    proptest! {
        #[test]
        fn prop_expr_integer_addition(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let src = format!("({}) + ({})", a, b);
            prop_assert_eq!(eval_expr(&src, &Scope::new()).unwrap(), Value::Int(a + b));
        }

        #[test]
        fn prop_expr_mod_matches_floor_division(a in -1000i64..1000, b in 1i64..50) {
            let s = Scope::new();
            let q = eval_expr(&format!("({}) / {}", a, b), &s).unwrap().as_int().unwrap();
            let r = eval_expr(&format!("({}) % {}", a, b), &s).unwrap().as_int().unwrap();
            prop_assert_eq!(q * b + r, a);
            prop_assert!((0..b).contains(&r));
        }

        #[test]
        fn prop_expr_floor_ops_full_range(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(b != 0);
            match (floor_div(a, b), floor_mod(a, b)) {
                (Some(q), Some(r)) => {
                    prop_assert_eq!(
                        i128::from(q) * i128::from(b) + i128::from(r),
                        i128::from(a)
                    );
                    prop_assert!(r == 0 || (r < 0) == (b < 0));
                    prop_assert!(r.unsigned_abs() < b.unsigned_abs());
                }
                (None, Some(r)) => {
                    prop_assert_eq!((a, b, r), (i64::MIN, -1, 0));
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
