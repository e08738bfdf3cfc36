//! Zare Lexer
//!
//! Tokenizes `.zare` template source into a flat stream of tokens.
//! The scanner has two modes: the setup phase (`use`, `as … import`, `link`,
//! `import`, `fn`) and the body phase that begins after `serve`, where HTML
//! markup, `@( … )` parameters, `@name( … )` calls and the `@if`/`@else`/`@each`
//! control constructs are recognized.
//!
//! # Example
//!
//! ```
//! use zare_lexer::{Keyword, Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("serve (<p>@(name)</p>)", "page.zare").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Keyword(Keyword::Serve));
//! assert!(tokens.iter().any(|t| t.kind == TokenKind::ParameterExpression));
//! ```

pub mod scanner;
pub mod token;

pub use scanner::{Scanner, ScannerMode};
pub use token::{
    is_raw_text_element, is_void_element, Keyword, Location, Span, Token, TokenKind,
};

/// The distinct template-format failures the scanner can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexerErrorKind {
    #[error("String literal was not closed")]
    UnterminatedString,
    #[error("'>' is missing")]
    UnterminatedTag,
    #[error("Unended parenthesis ')'")]
    UnterminatedParen,
    #[error("Unended block '}}'")]
    UnterminatedBlock,
    #[error("Unended parameter expression")]
    UnterminatedParameter,
    #[error("Unended comment '-->'")]
    UnterminatedComment,
    #[error("Expected '(' after {0}")]
    MissingParen(Keyword),
}

/// Lexer error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Template Error: at {location} {kind}")]
pub struct LexerError {
    pub kind: LexerErrorKind,
    pub location: Location,
}
