//! Zare Parser
//!
//! Walks a token stream from `zare-lexer` and produces HTML directly: setup
//! statements register components, stylesheet/script links and functions,
//! then the `serve ( … )` body is rendered with conditionals, loops, component
//! invocations and function calls evaluated on the fly.
//!
//! Expressions (`@if` conditions, function bodies) go through a sandboxed
//! interpreter: `expr_lexer` → `expr_parser` → `evaluator`. Nothing is handed
//! to a host `eval`.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use zare_parser::{MemoryResolver, Parser, Session};
//!
//! let tokens = zare_lexer::Scanner::tokenize("serve (<p>@(name)</p>)", "page.zare").unwrap();
//! let resolver = MemoryResolver::new();
//! let mut session = Session::new(&resolver);
//! let params = json!({ "name": "Ada" }).as_object().cloned().unwrap();
//! let html = Parser::new(&mut session, tokens, params, "page.zare").render().unwrap();
//! assert_eq!(html, "<p>Ada</p>");
//! ```

pub mod ast;
pub mod call;
pub mod coerce;
pub mod evaluator;
pub mod expr_lexer;
pub mod expr_parser;
pub mod function;
pub mod link;
pub mod modules;
pub mod params;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod session;
pub(crate) mod stack;

pub use evaluator::EvalError;
pub use function::Function;
pub use params::{get_value, substitute_parameters, Params};
pub use parser::Parser;
pub use resolver::{
    ComponentResolver, FileSystemResolver, MemoryResolver, ResolveError, ResolvedComponent,
};
pub use scope::{ScopeArena, ScopeId};
pub use session::{Session, DEFAULT_MAX_DEPTH};

use zare_lexer::{LexerError, Location, Token};

/// Parser error. Every variant carries the file path, line and column of the
/// token that triggered it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// Malformed template text.
    #[error(transparent)]
    Lexer(#[from] LexerError),

    /// Malformed template structure or a failed evaluation.
    #[error("Template Error: at {location} {cause}")]
    Template { cause: String, location: Location },

    /// A token other than the one the grammar requires.
    #[error("Syntax Error: {message}\n  at {location}\n  Expected: {expected}\n  Received: {received}")]
    Syntax {
        message: String,
        expected: String,
        received: String,
        location: Location,
    },

    /// A well-formed template that cannot be rendered with the given data.
    #[error("Runtime Error: at {location} {message}")]
    Runtime { message: String, location: Location },
}

impl ParseError {
    pub fn template(cause: impl Into<String>, token: &Token) -> Self {
        ParseError::Template {
            cause: cause.into(),
            location: token.location(),
        }
    }

    pub fn syntax(
        message: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
        location: Location,
    ) -> Self {
        ParseError::Syntax {
            message: message.into(),
            expected: expected.into(),
            received: received.into(),
            location,
        }
    }

    pub fn runtime(message: impl Into<String>, location: Location) -> Self {
        ParseError::Runtime {
            message: message.into(),
            location,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            ParseError::Lexer(e) => &e.location,
            ParseError::Template { location, .. }
            | ParseError::Syntax { location, .. }
            | ParseError::Runtime { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = ParseError::syntax(
            "Expected a keyword",
            "'as', 'serve', 'fn' or 'link'",
            "hello",
            Location::new("views/index.zare", 2, 4),
        );
        assert_eq!(
            err.to_string(),
            "Syntax Error: Expected a keyword\n  at file:///views/index.zare:2:4\n  Expected: 'as', 'serve', 'fn' or 'link'\n  Received: hello"
        );
    }

    #[test]
    fn test_runtime_error_location() {
        let err = ParseError::runtime("boom", Location::new("a.zare", 1, 1));
        assert_eq!(err.location().file_path, "a.zare");
        assert_eq!(err.to_string(), "Runtime Error: at file:///a.zare:1:1 boom");
    }
}
