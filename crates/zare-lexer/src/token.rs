use std::rc::Rc;

/// A position in source text, tracking line and column for error reporting.
///
/// `start`/`end` are character offsets. `line`/`column` follow the scanner's
/// convention: single-character tokens carry the position of the character
/// itself, multi-character scans carry the position reached after the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Reserved words of the setup phase plus the `@`-prefixed control keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    As,
    Import,
    Link,
    Fn,
    Use,
    Serve,
    If,
    Else,
    Each,
}

impl Keyword {
    /// Setup-phase keyword for a bare word, if it is one.
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "as" => Some(Keyword::As),
            "import" => Some(Keyword::Import),
            "link" => Some(Keyword::Link),
            "fn" => Some(Keyword::Fn),
            "use" => Some(Keyword::Use),
            "serve" => Some(Keyword::Serve),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::As => "as",
            Keyword::Import => "import",
            Keyword::Link => "link",
            Keyword::Fn => "fn",
            Keyword::Use => "use",
            Keyword::Serve => "serve",
            Keyword::If => "@if",
            Keyword::Else => "@else",
            Keyword::Each => "@each",
        }
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token classification for Zare source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Text,
    String,
    /// A single whitespace character.
    Escape,
    LParen,
    RParen,
    OpeningTag,
    ClosingTag,
    SelfClosingTag,
    Doctype,
    /// `(cond)` following `@if`, outer parens included.
    Condition,
    /// Inner text of a `{ ... }` block.
    CodeBlock,
    /// `(array:binding)` following `@each`.
    EachExpression,
    /// `@( ... )`
    ParameterExpression,
    /// `@name( ... )`
    FunctionCall,
    Unknown,
}

/// A token produced by the Zare scanner.
///
/// `value` always holds the token's source text, so concatenating the values
/// of a plain-markup token stream reproduces the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub span: Span,
    pub file_path: Rc<str>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, span: Span, file_path: Rc<str>) -> Self {
        Self {
            kind,
            value: value.into(),
            span,
            file_path,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    /// Source location of this token, for diagnostics.
    pub fn location(&self) -> Location {
        Location::new(&*self.file_path, self.span.line, self.span.column)
    }
}

/// A file path plus line and column, rendered as a `file:///` URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file_path: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file_path: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut path = String::with_capacity(self.file_path.len());
        let mut in_space = false;
        for c in self.file_path.chars() {
            if c.is_whitespace() {
                if !in_space {
                    path.push_str("%20");
                }
                in_space = true;
            } else {
                path.push(c);
                in_space = false;
            }
        }
        write!(f, "file:///{path}:{}:{}", self.line, self.column)
    }
}

/// HTML5 void elements (no closing tag).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Check if a tag name is an HTML5 void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Elements whose content is emitted verbatim.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|r| r.eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display_escapes_spaces() {
        let location = Location::new("my views/home page.zare", 3, 7);
        assert_eq!(
            location.to_string(),
            "file:///my%20views/home%20page.zare:3:7"
        );
    }

    #[test]
    fn test_keyword_from_word() {
        assert_eq!(Keyword::from_word("serve"), Some(Keyword::Serve));
        assert_eq!(Keyword::from_word("if"), None);
        assert_eq!(Keyword::If.as_str(), "@if");
    }

    #[test]
    fn test_void_elements_case_insensitive() {
        assert!(is_void_element("meta"));
        assert!(is_void_element("BR"));
        assert!(!is_void_element("div"));
    }
}
