//! Lexer for Zare expressions.
//!
//! Tokenizes `@if` conditions and `fn` bodies for the sandboxed interpreter.
//! Inside expressions `@(path)` is a parameter reference and `@name` is the
//! same as `name`, so template-style calls can be written in conditions.
//!
//! # Examples
//!
//! ```
//! use zare_parser::expr_lexer::{ExprLexer, TokenKind};
//!
//! let kinds: Vec<_> = ExprLexer::tokenize("items.length > 0")
//!     .unwrap()
//!     .into_iter()
//!     .map(|t| t.kind)
//!     .collect();
//! assert_eq!(kinds[1], TokenKind::Dot);
//! assert_eq!(kinds[3], TokenKind::Gt);
//! ```

use crate::ast::ExprSpan;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: ExprSpan,
    pub value: TokenValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Boolean,
    Null,
    Undefined,
    Identifier,
    Typeof,
    /// `@(path)`
    ParamRef,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    Lte,
    Gte,

    And,
    Or,
    Not,
    QuestionQuestion,

    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PlusPlus,
    MinusMinus,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Dot,
    Comma,
    Colon,
    Semicolon,
    Question,
    OptionalChain,

    Eof,
}

/// Literal payload of a token; operators carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    String(String),
    Boolean(bool),
    Identifier(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at position {}", span.start)]
pub struct ExprLexerError {
    pub message: String,
    pub span: ExprSpan,
}

/// Operators and punctuation, longest spelling first so that a prefix never
/// shadows a longer operator.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("===", TokenKind::StrictEq),
    ("!==", TokenKind::StrictNotEq),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::NotEq),
    ("<=", TokenKind::Lte),
    (">=", TokenKind::Gte),
    ("&&", TokenKind::And),
    ("||", TokenKind::Or),
    ("??", TokenKind::QuestionQuestion),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
    ("+=", TokenKind::PlusEq),
    ("-=", TokenKind::MinusEq),
    ("*=", TokenKind::StarEq),
    ("/=", TokenKind::SlashEq),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("!", TokenKind::Not),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("=", TokenKind::Eq),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    (".", TokenKind::Dot),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    (";", TokenKind::Semicolon),
    ("?", TokenKind::Question),
];

pub struct ExprLexer {
    chars: Vec<char>,
    pos: usize,
}

impl ExprLexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    /// All tokens of `source`, terminated by a single `Eof`.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprLexerError> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ExprLexerError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.ch(0) else {
            return Ok(self.token(TokenKind::Eof, start, TokenValue::None));
        };

        match c {
            '0'..='9' => self.number(start),
            '.' if self.ch(1).is_some_and(|d| d.is_ascii_digit()) => self.number(start),
            '"' | '\'' | '`' => self.string(start, c),
            '@' if self.ch(1) == Some('(') => self.reference(start),
            '@' if self.ch(1).is_some_and(is_word_start) => {
                self.pos += 1;
                Ok(self.word(self.pos))
            }
            c if is_word_start(c) => Ok(self.word(start)),
            // `a?.b`, but not the ternary in `a ?.5 : 1`
            '?' if self.ch(1) == Some('.') && !self.ch(2).is_some_and(|d| d.is_ascii_digit()) => {
                self.pos += 2;
                Ok(self.token(TokenKind::OptionalChain, start, TokenValue::None))
            }
            _ => self.operator(start, c),
        }
    }

    // =========================================================================
    // Scanners
    // =========================================================================

    fn number(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        self.eat_while(|c| c.is_ascii_digit() || c == '.');

        let exponent = matches!(self.ch(0), Some('e' | 'E'))
            && match self.ch(1) {
                Some('+' | '-') => self.ch(2).is_some_and(|d| d.is_ascii_digit()),
                next => next.is_some_and(|d| d.is_ascii_digit()),
            };
        if exponent {
            self.pos += if matches!(self.ch(1), Some('+' | '-')) { 2 } else { 1 };
            self.eat_while(|c| c.is_ascii_digit());
        }

        let text = self.slice(start);
        match text.parse::<f64>() {
            Ok(n) => Ok(self.token(TokenKind::Number, start, TokenValue::Number(n))),
            Err(_) => Err(self.error(format!("Malformed number `{text}`"), start)),
        }
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, ExprLexerError> {
        self.pos += 1;
        let mut text = String::new();

        loop {
            match self.ch(0) {
                None => return Err(self.error("Unterminated string literal", start)),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let Some(escaped) = self.ch(1) else {
                        return Err(self.error("Unterminated string literal", start));
                    };
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '\\' => text.push('\\'),
                        c if c == quote => text.push(c),
                        c => {
                            text.push('\\');
                            text.push(c);
                        }
                    }
                    self.pos += 2;
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        self.pos += 1;
        Ok(self.token(TokenKind::String, start, TokenValue::String(text)))
    }

    /// Identifier or one of the literal keywords.
    fn word(&mut self, start: usize) -> Token {
        self.eat_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
        let (kind, value) = match self.slice(start).as_str() {
            "true" => (TokenKind::Boolean, TokenValue::Boolean(true)),
            "false" => (TokenKind::Boolean, TokenValue::Boolean(false)),
            "null" => (TokenKind::Null, TokenValue::None),
            "undefined" => (TokenKind::Undefined, TokenValue::None),
            "typeof" => (TokenKind::Typeof, TokenValue::None),
            name => (TokenKind::Identifier, TokenValue::Identifier(name.to_string())),
        };
        self.token(kind, start, value)
    }

    /// `@( path )`; the value is the trimmed path.
    fn reference(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        self.pos += 2;
        let inner = self.pos;
        let mut depth = 1usize;

        while let Some(c) = self.ch(0) {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let path = self.slice(inner).trim().to_string();
                        self.pos += 1;
                        return Ok(self.token(TokenKind::ParamRef, start, TokenValue::String(path)));
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }

        Err(self.error("Unterminated parameter reference", start))
    }

    fn operator(&mut self, start: usize, c: char) -> Result<Token, ExprLexerError> {
        let found = OPERATORS.iter().find(|(spelling, _)| {
            spelling
                .chars()
                .enumerate()
                .all(|(i, expected)| self.ch(i) == Some(expected))
        });
        match found {
            Some(&(spelling, kind)) => {
                self.pos += spelling.len();
                Ok(self.token(kind, start, TokenValue::None))
            }
            None => Err(ExprLexerError {
                message: format!("Unexpected character `{c}`"),
                span: ExprSpan::new(start, start + 1),
            }),
        }
    }

    /// Whitespace plus `//` and `/* */` comments.
    fn skip_trivia(&mut self) {
        loop {
            self.eat_while(char::is_whitespace);
            match (self.ch(0), self.ch(1)) {
                (Some('/'), Some('/')) => self.eat_while(|c| c != '\n'),
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while self.ch(0).is_some() && !(self.ch(0) == Some('*') && self.ch(1) == Some('/')) {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => return,
            }
        }
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    fn ch(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat_while(&mut self, keep: impl Fn(char) -> bool) {
        while self.ch(0).is_some_and(&keep) {
            self.pos += 1;
        }
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn token(&self, kind: TokenKind, start: usize, value: TokenValue) -> Token {
        Token {
            kind,
            span: ExprSpan::new(start, self.pos),
            value,
        }
    }

    fn error(&self, message: impl Into<String>, start: usize) -> ExprLexerError {
        ExprLexerError {
            message: message.into(),
            span: ExprSpan::new(start, self.pos),
        }
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}
