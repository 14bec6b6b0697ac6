//! Recipe parsing: tokenizer and recursive-descent parser.
//!
//! ```text
//! input      := (comment-line | reference)* END
//! reference  := NAME expr
//! expr       := atom | reference | structure
//! atom       := NUMBER | STRING | SHELL-LINE
//! structure  := '[' expr* ']' | '(' reference* ')'
//! ```
//!
//! A shell sentinel (`$`, `>` or `|`) takes the rest of its line verbatim,
//! newline included. `#` starts a comment that runs to the end of the line.

use super::error::SyntaxError;
use super::types::{Reference, Value};
use indexmap::IndexMap;

const END_CHAR: char = '\0';

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(i64),
    Str(String),
    Name(String),
    Shell(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    End,
}

impl TokenKind {
    fn text(&self) -> String {
        match self {
            TokenKind::Number(n) => n.to_string(),
            TokenKind::Str(s) => format!("{:?}", s),
            TokenKind::Name(n) => n.clone(),
            TokenKind::Shell(line) => format!("${}", line.trim_end()),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::LBracket => "[".to_string(),
            TokenKind::RBracket => "]".to_string(),
            TokenKind::End => "<end>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(input: &str) -> Lexer {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or(END_CHAR)
    }

    fn bump(&mut self) -> char {
        let c = self.current();
        if self.pos < self.chars.len() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn error(&self, message: impl Into<String>, token: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            token: token.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.current() {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '#' => {
                    while self.current() != '\n' && self.pos < self.chars.len() {
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let c = self.current();
        let kind = match c {
            END_CHAR => TokenKind::End,
            '(' => {
                self.bump();
                TokenKind::LParen
            }
            ')' => {
                self.bump();
                TokenKind::RParen
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            '$' | '>' | '|' => {
                self.bump();
                TokenKind::Shell(self.read_line())
            }
            '\'' | '"' => TokenKind::Str(self.read_string(c)?),
            c if c.is_ascii_digit() => TokenKind::Number(self.read_number()?),
            c if c.is_ascii_alphabetic() => TokenKind::Name(self.read_name()),
            other => {
                return Err(self.error(format!("unexpected character {:?}", other), other))
            }
        };
        Ok(Token { kind, line, column })
    }

    /// Rest of the current line, keeping leading whitespace and the newline.
    fn read_line(&mut self) -> String {
        let mut line = String::new();
        while self.pos < self.chars.len() {
            let c = self.bump();
            line.push(c);
            if c == '\n' {
                break;
            }
        }
        line
    }

    fn read_string(&mut self, quote: char) -> Result<String, SyntaxError> {
        self.bump();
        let mut out = String::new();
        loop {
            let c = self.current();
            if c == quote {
                self.bump();
                return Ok(out);
            }
            if c == '\n' || self.pos >= self.chars.len() {
                return Err(self.error("unterminated string", format!("{}{}", quote, out)));
            }
            self.bump();
            if c != '\\' {
                out.push(c);
                continue;
            }
            if self.pos >= self.chars.len() {
                return Err(self.error("unterminated string", format!("{}{}", quote, out)));
            }
            match self.bump() {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<i64, SyntaxError> {
        let mut digits = String::new();
        while self.current().is_ascii_digit() || self.current() == '.' {
            digits.push(self.bump());
        }
        if digits.contains('.') {
            return Err(self.error("only integer literals are supported", digits));
        }
        digits
            .parse::<i64>()
            .map_err(|_| self.error("integer literal out of range", digits.clone()))
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while is_name_char(self.current()) {
            name.push(self.bump());
        }
        name
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.')
}

struct Parser {
    lexer: Lexer,
    peeked: Option<Token>,
}

impl Parser {
    fn new(input: &str) -> Parser {
        Parser {
            lexer: Lexer::new(input),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<&Token, SyntaxError> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn next(&mut self) -> Result<Token, SyntaxError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn unexpected(token: &Token, expected: &str) -> SyntaxError {
        SyntaxError {
            message: format!("expected {}", expected),
            token: token.kind.text(),
            line: token.line,
            column: token.column,
        }
    }

    fn input(&mut self) -> Result<IndexMap<String, Value>, SyntaxError> {
        let mut data = IndexMap::new();
        loop {
            let token = self.peek()?;
            match token.kind {
                TokenKind::End => break,
                TokenKind::Name(_) => {
                    let reference = self.reference()?;
                    data.insert(reference.name, reference.expr);
                }
                _ => {
                    let token = token.clone();
                    return Err(Self::unexpected(&token, "a stanza name"));
                }
            }
        }
        Ok(data)
    }

    fn reference(&mut self) -> Result<Reference, SyntaxError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Name(name) => {
                let expr = self.expr()?;
                Ok(Reference { name, expr })
            }
            _ => Err(Self::unexpected(&token, "a name")),
        }
    }

    fn expr(&mut self) -> Result<Value, SyntaxError> {
        match self.peek()?.kind {
            TokenKind::Name(_) => Ok(Value::Reference(Box::new(self.reference()?))),
            TokenKind::LBracket => self.sequence(),
            TokenKind::LParen => self.mapping(),
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Value, SyntaxError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Value::Int(n)),
            TokenKind::Str(s) | TokenKind::Shell(s) => Ok(Value::Str(s)),
            _ => Err(Self::unexpected(
                &token,
                "a number, string, shell line, name, '[' or '('",
            )),
        }
    }

    fn sequence(&mut self) -> Result<Value, SyntaxError> {
        self.next()?;
        let mut items = Vec::new();
        loop {
            if self.peek()?.kind == TokenKind::RBracket {
                self.next()?;
                return Ok(Value::Seq(items));
            }
            if self.peek()?.kind == TokenKind::End {
                let token = self.next()?;
                return Err(Self::unexpected(&token, "']'"));
            }
            items.push(self.expr()?);
        }
    }

    fn mapping(&mut self) -> Result<Value, SyntaxError> {
        self.next()?;
        let mut map = IndexMap::new();
        loop {
            let token = self.peek()?.clone();
            match token.kind {
                TokenKind::RParen => {
                    self.next()?;
                    return Ok(Value::Map(map));
                }
                TokenKind::Name(_) => {
                    let reference = self.reference()?;
                    map.insert(reference.name, reference.expr);
                }
                _ => return Err(Self::unexpected(&token, "a key name or ')'")),
            }
        }
    }

    fn finish(&mut self) -> Result<(), SyntaxError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::End => Ok(()),
            _ => Err(Self::unexpected(&token, "end of input")),
        }
    }
}

/// Parse a whole recipe into its top-level stanzas (later names win).
pub fn parse_spec(text: &str) -> Result<IndexMap<String, Value>, SyntaxError> {
    let mut parser = Parser::new(text);
    let data = parser.input()?;
    parser.finish()?;
    Ok(data)
}

/// Parse a single expression.
pub fn parse_expr(text: &str) -> Result<Value, SyntaxError> {
    let mut parser = Parser::new(text);
    let value = parser.expr()?;
    parser.finish()?;
    Ok(value)
}

/// Parse a single `name expr` reference.
pub fn parse_reference(text: &str) -> Result<Reference, SyntaxError> {
    let mut parser = Parser::new(text);
    let reference = parser.reference()?;
    parser.finish()?;
    Ok(reference)
}
