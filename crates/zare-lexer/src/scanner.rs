use std::rc::Rc;

use crate::token::{is_raw_text_element, Keyword, Location, Span, Token, TokenKind};
use crate::{LexerError, LexerErrorKind};

/// Scanner mode determines which constructs are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerMode {
    /// Setup statements: keywords, `#` comments, string literals, `{ … }` bodies.
    Setup,
    /// Everything after `serve`: markup, HTML comments, quotes are plain text.
    Body,
}

/// Zare source scanner.
///
/// Tokenizes a whole template in one pass. Every whitespace character becomes
/// its own `Escape` token and unrecognized characters become single-character
/// `Unknown` tokens, so plain markup survives tokenization unchanged.
///
/// Positions follow one rule: the current line/column always describe the
/// character under the cursor, and a newline character counts as column 1 of
/// the line it starts.
pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    mode: ScannerMode,
    file_path: Rc<str>,
}

impl Scanner {
    /// Create a new scanner for the given source.
    pub fn new(source: &str, file_path: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            mode: ScannerMode::Setup,
            file_path: Rc::from(file_path),
        }
    }

    /// Create a scanner with a specific mode.
    pub fn with_mode(source: &str, file_path: &str, mode: ScannerMode) -> Self {
        let mut scanner = Self::new(source, file_path);
        scanner.mode = mode;
        scanner
    }

    /// Tokenize a whole template, starting in the setup phase.
    pub fn tokenize(source: &str, file_path: &str) -> Result<Vec<Token>, LexerError> {
        let mut scanner = Scanner::new(source, file_path);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }

    /// Tokenize a fragment that is body content from the first character
    /// (branch, loop and slot bodies).
    pub fn tokenize_body(source: &str, file_path: &str) -> Result<Vec<Token>, LexerError> {
        let mut scanner = Scanner::with_mode(source, file_path, ScannerMode::Body);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }

    fn scan_tokens(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }
        Ok(())
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let ch = self.peek();
        let body = self.mode == ScannerMode::Body;

        match ch {
            c if is_space(c) => {
                self.emit_char(TokenKind::Escape);
                Ok(())
            }
            '#' if !body => {
                self.skip_line_comment();
                Ok(())
            }
            '<' if body && self.starts_with("<!--") => self.skip_html_comment(),
            c if is_word_char(c) => {
                self.scan_word();
                Ok(())
            }
            '"' | '\'' | '`' if !body => self.scan_string(),
            '(' => {
                self.emit_char(TokenKind::LParen);
                Ok(())
            }
            ')' => {
                self.emit_char(TokenKind::RParen);
                Ok(())
            }
            '<' => self.scan_tag(),
            '@' if self.peek_next() == '(' => self.scan_parameter(),
            '@' if self.at_control_keyword("if") => self.scan_if(),
            '@' if self.at_control_keyword("else") => self.scan_else(),
            '@' if self.at_control_keyword("each") => self.scan_each(),
            '@' => {
                if !self.scan_function_call() {
                    self.emit_char(TokenKind::Unknown);
                }
                Ok(())
            }
            '{' if !body => self.scan_code_block(),
            _ => {
                self.emit_char(TokenKind::Unknown);
                Ok(())
            }
        }
    }

    // --- Comments ---

    /// `# …` through the end of the line, newline included.
    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        self.advance();
    }

    fn skip_html_comment(&mut self) -> Result<(), LexerError> {
        let location = self.location();
        for _ in 0.."<!--".len() {
            self.advance();
        }
        while !self.is_at_end() {
            if self.starts_with("-->") {
                for _ in 0.."-->".len() {
                    self.advance();
                }
                return Ok(());
            }
            self.advance();
        }
        Err(LexerError {
            kind: LexerErrorKind::UnterminatedComment,
            location,
        })
    }

    // --- Scanners ---

    /// A run of word characters: a setup keyword or plain text.
    fn scan_word(&mut self) {
        let start = self.pos;
        let mut word = String::new();
        while !self.is_at_end() && is_word_char(self.peek()) {
            word.push(self.peek());
            self.advance();
        }

        let keyword = match self.mode {
            ScannerMode::Setup => Keyword::from_word(&word),
            ScannerMode::Body => None,
        };
        match keyword {
            Some(keyword) => {
                self.emit(TokenKind::Keyword(keyword), word, start);
                if keyword == Keyword::Serve {
                    self.mode = ScannerMode::Body;
                }
            }
            None => self.emit(TokenKind::Text, word, start),
        }
    }

    /// A quoted literal, kept verbatim with its delimiters.
    fn scan_string(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        let quote = self.peek();
        let mut value = String::from(quote);
        self.advance();

        while !self.is_at_end() && self.peek() != quote {
            if self.peek() == '\\' {
                value.push('\\');
                self.advance();
                if self.is_at_end() {
                    break;
                }
            }
            value.push(self.peek());
            self.advance();
        }

        if self.is_at_end() {
            return Err(self.error(LexerErrorKind::UnterminatedString));
        }

        value.push(quote);
        self.advance();
        self.emit(TokenKind::String, value, start);
        Ok(())
    }

    /// `<…>` up to the first `>`, classified by shape.
    fn scan_tag(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        let mut word = String::new();
        while !self.is_at_end() && self.peek() != '>' {
            word.push(self.peek());
            self.advance();
        }

        if self.is_at_end() {
            return Err(self.error(LexerErrorKind::UnterminatedTag));
        }

        word.push('>');
        self.advance();

        let kind = classify_tag(&word);
        let raw_element = match (self.mode, kind) {
            (ScannerMode::Body, TokenKind::OpeningTag) => tag_name(&word)
                .filter(|name| is_raw_text_element(name))
                .map(str::to_ascii_lowercase),
            _ => None,
        };
        self.emit(kind, word, start);

        if let Some(element) = raw_element {
            self.scan_raw_text(&element);
        }
        Ok(())
    }

    /// Content of `<style>`/`<script>` up to its closing tag, as one `Text`.
    fn scan_raw_text(&mut self, element: &str) {
        let start = self.pos;
        let closing = format!("</{element}");
        let mut content = String::new();
        while !self.is_at_end() && !self.starts_with_ignore_case(&closing) {
            content.push(self.peek());
            self.advance();
        }
        if !content.is_empty() {
            self.emit(TokenKind::Text, content, start);
        }
    }

    /// `@( … )` with paren depth tracking.
    fn scan_parameter(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        let location = self.location();
        let mut value = String::from("@(");
        self.advance();
        self.advance();

        let mut depth = 1;
        while !self.is_at_end() {
            let c = self.peek();
            value.push(c);
            self.advance();
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.emit(TokenKind::ParameterExpression, value, start);
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        Err(LexerError {
            kind: LexerErrorKind::UnterminatedParameter,
            location,
        })
    }

    fn scan_if(&mut self) -> Result<(), LexerError> {
        self.emit_keyword(Keyword::If);
        self.skip_spaces();
        let condition = self.scan_parenthesized(Keyword::If)?;
        let start = self.pos;
        self.emit(TokenKind::Condition, condition, start);
        self.scan_optional_block()
    }

    fn scan_else(&mut self) -> Result<(), LexerError> {
        self.emit_keyword(Keyword::Else);
        self.scan_optional_block()
    }

    fn scan_each(&mut self) -> Result<(), LexerError> {
        self.emit_keyword(Keyword::Each);
        self.skip_spaces();
        let expression = self.scan_parenthesized(Keyword::Each)?;
        let start = self.pos;
        self.emit(TokenKind::EachExpression, expression, start);
        self.scan_optional_block()
    }

    /// Emits a `@`-keyword token positioned at the `@` and moves past it.
    fn emit_keyword(&mut self, keyword: Keyword) {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        for _ in keyword.as_str().chars() {
            self.advance();
        }
        let span = Span::new(start, self.pos, line, column);
        self.tokens.push(Token::new(
            TokenKind::Keyword(keyword),
            keyword.as_str(),
            span,
            Rc::clone(&self.file_path),
        ));
    }

    fn scan_optional_block(&mut self) -> Result<(), LexerError> {
        self.skip_spaces();
        if self.peek() == '{' && !self.is_at_end() {
            self.scan_code_block()?;
        }
        Ok(())
    }

    /// `( … )` after `@if`/`@each`. Whitespace outside string literals is
    /// dropped from the captured value; the outer parens are kept.
    fn scan_parenthesized(&mut self, keyword: Keyword) -> Result<String, LexerError> {
        if self.is_at_end() || self.peek() != '(' {
            return Err(self.error(LexerErrorKind::MissingParen(keyword)));
        }

        let location = self.location();
        let mut value = String::from("(");
        self.advance();

        let mut depth = 1;
        let mut quote: Option<char> = None;
        while !self.is_at_end() {
            let c = self.peek();
            self.advance();
            match quote {
                Some(q) => {
                    value.push(c);
                    if c == '\\' && !self.is_at_end() {
                        value.push(self.peek());
                        self.advance();
                    } else if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    c if is_space(c) => {}
                    '"' | '\'' | '`' => {
                        quote = Some(c);
                        value.push(c);
                    }
                    '(' => {
                        depth += 1;
                        value.push(c);
                    }
                    ')' => {
                        depth -= 1;
                        value.push(c);
                        if depth == 0 {
                            return Ok(value);
                        }
                    }
                    _ => value.push(c),
                },
            }
        }

        Err(LexerError {
            kind: LexerErrorKind::UnterminatedParen,
            location,
        })
    }

    /// `{ … }` with brace depth tracking; the token holds the inner text.
    /// Setup-phase blocks are function bodies, so braces inside string
    /// literals do not count there.
    fn scan_code_block(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        let location = self.location();
        self.advance();

        let string_aware = self.mode == ScannerMode::Setup;
        let mut depth = 1;
        let mut quote: Option<char> = None;
        let mut content = String::new();
        while !self.is_at_end() {
            let c = self.peek();
            self.advance();

            if let Some(q) = quote {
                content.push(c);
                if c == '\\' && !self.is_at_end() {
                    content.push(self.peek());
                    self.advance();
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            match c {
                '"' | '\'' | '`' if string_aware => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.emit(TokenKind::CodeBlock, content, start);
                        return Ok(());
                    }
                }
                _ => {}
            }
            content.push(c);
        }

        Err(LexerError {
            kind: LexerErrorKind::UnterminatedBlock,
            location,
        })
    }

    /// `@name( … )`. Returns `false` and leaves the cursor on the `@` when the
    /// text does not have the shape of a call.
    fn scan_function_call(&mut self) -> bool {
        let saved = (self.pos, self.line, self.column);
        let start = self.pos;
        let mut value = String::from("@");
        self.advance();

        let mut has_name = false;
        while !self.is_at_end() && is_word_char(self.peek()) {
            value.push(self.peek());
            self.advance();
            has_name = true;
        }

        if has_name && !self.is_at_end() && self.peek() == '(' {
            let mut depth = 0;
            let mut quote: Option<char> = None;
            while !self.is_at_end() {
                let c = self.peek();
                value.push(c);
                self.advance();

                if let Some(q) = quote {
                    if c == '\\' && !self.is_at_end() {
                        value.push(self.peek());
                        self.advance();
                    } else if c == q {
                        quote = None;
                    }
                    continue;
                }

                match c {
                    '"' | '\'' | '`' => quote = Some(c),
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            self.emit(TokenKind::FunctionCall, value, start);
                            return true;
                        }
                    }
                    _ => {}
                }
            }
        }

        (self.pos, self.line, self.column) = saved;
        false
    }

    // --- Helpers ---

    /// Push a token spanning `start..pos`, positioned where the scan ended.
    fn emit(&mut self, kind: TokenKind, value: String, start: usize) {
        let span = Span::new(start, self.pos, self.line, self.column);
        self.tokens
            .push(Token::new(kind, value, span, Rc::clone(&self.file_path)));
    }

    /// Push the character under the cursor as its own token and move past it.
    fn emit_char(&mut self, kind: TokenKind) {
        let span = Span::new(self.pos, self.pos + 1, self.line, self.column);
        let value = self.peek().to_string();
        self.tokens
            .push(Token::new(kind, value, span, Rc::clone(&self.file_path)));
        self.advance();
    }

    fn skip_spaces(&mut self) {
        while !self.is_at_end() && is_space(self.peek()) {
            self.advance();
        }
    }

    /// `@if`, `@else`, `@each` not followed by another word character.
    fn at_control_keyword(&self, word: &str) -> bool {
        let len = word.chars().count();
        word.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + 1 + i) == Some(&c))
            && !self
                .chars
                .get(self.pos + 1 + len)
                .is_some_and(|c| is_word_char(*c))
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn starts_with_ignore_case(&self, text: &str) -> bool {
        text.chars().enumerate().all(|(i, c)| {
            self.chars
                .get(self.pos + i)
                .is_some_and(|s| s.eq_ignore_ascii_case(&c))
        })
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.pos]
        }
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if self.is_at_end() {
            return;
        }
        self.pos += 1;
        if !self.is_at_end() {
            if self.chars[self.pos] == '\n' {
                self.line += 1;
                self.column = 0;
            }
            self.column += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn location(&self) -> Location {
        Location::new(&*self.file_path, self.line, self.column)
    }

    fn error(&self, kind: LexerErrorKind) -> LexerError {
        LexerError {
            kind,
            location: self.location(),
        }
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C')
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn classify_tag(word: &str) -> TokenKind {
    if word
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!DOCTYPE"))
    {
        TokenKind::Doctype
    } else if word.starts_with("</") {
        TokenKind::ClosingTag
    } else if word.ends_with("/>") {
        TokenKind::SelfClosingTag
    } else {
        TokenKind::OpeningTag
    }
}

fn tag_name(word: &str) -> Option<&str> {
    let rest = word.strip_prefix('<')?;
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Helper: tokenize a whole template and return token kinds.
    fn kinds(source: &str) -> Vec<TokenKind> {
        tokens(source).into_iter().map(|t| t.kind).collect()
    }

    /// Helper: tokenize and panic on error.
    fn tokens(source: &str) -> Vec<Token> {
        Scanner::tokenize(source, "template.zare").unwrap()
    }

    /// Helper: tokenize body content and return `(kind, value)` pairs.
    fn body(source: &str) -> Vec<(TokenKind, String)> {
        Scanner::tokenize_body(source, "template.zare")
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    fn error_kind(source: &str) -> LexerErrorKind {
        Scanner::tokenize(source, "template.zare").unwrap_err().kind
    }

    // =========================================================================
    // Keywords and text
    // =========================================================================

    #[test]
    fn test_single_keyword() {
        let toks = tokens("import");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Keyword(Keyword::Import));
        assert_eq!(toks[0].value, "import");
        assert_eq!(toks[0].span.line, 1);
        assert_eq!(toks[0].span.column, 6);
        assert_eq!(&*toks[0].file_path, "template.zare");
    }

    #[test]
    fn test_all_setup_keywords() {
        let k: Vec<_> = kinds("as import link fn use")
            .into_iter()
            .filter(|k| *k != TokenKind::Escape)
            .collect();
        assert_eq!(
            k,
            vec![
                TokenKind::Keyword(Keyword::As),
                TokenKind::Keyword(Keyword::Import),
                TokenKind::Keyword(Keyword::Link),
                TokenKind::Keyword(Keyword::Fn),
                TokenKind::Keyword(Keyword::Use),
            ]
        );
    }

    #[test]
    fn test_keywords_are_text_after_serve() {
        assert_eq!(
            kinds("serve (import)"),
            vec![
                TokenKind::Keyword(Keyword::Serve),
                TokenKind::Escape,
                TokenKind::LParen,
                TokenKind::Text,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_word_run_stops_at_punctuation() {
        assert_eq!(
            body("Hi, there"),
            vec![
                (TokenKind::Text, "Hi".to_string()),
                (TokenKind::Unknown, ",".to_string()),
                (TokenKind::Escape, " ".to_string()),
                (TokenKind::Text, "there".to_string()),
            ]
        );
    }

    // =========================================================================
    // Comments
    // =========================================================================

    #[test]
    fn test_setup_line_comment() {
        assert!(tokens("# This is a non serve block comment").is_empty());
    }

    #[test]
    fn test_line_comment_before_statement() {
        assert_eq!(
            kinds("# header\nuse"),
            vec![TokenKind::Keyword(Keyword::Use)]
        );
    }

    #[test]
    fn test_hash_is_text_in_body() {
        assert_eq!(
            body("#1"),
            vec![
                (TokenKind::Unknown, "#".to_string()),
                (TokenKind::Text, "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_html_comment_in_body() {
        assert_eq!(
            kinds("serve (\n  <!-- This is a serve block comment -->\n)"),
            vec![
                TokenKind::Keyword(Keyword::Serve),
                TokenKind::Escape,
                TokenKind::LParen,
                TokenKind::Escape,
                TokenKind::Escape,
                TokenKind::Escape,
                TokenKind::Escape,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_html_comment_unterminated() {
        assert_eq!(
            error_kind("serve (<!-- never closed"),
            LexerErrorKind::UnterminatedComment
        );
    }

    // =========================================================================
    // Strings
    // =========================================================================

    #[test]
    fn test_string_kept_verbatim() {
        let toks = tokens("link \"./style\"");
        assert_eq!(toks[2].kind, TokenKind::String);
        assert_eq!(toks[2].value, "\"./style\"");
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let toks = tokens(r#"'it\'s'"#);
        assert_eq!(toks[0].value, r#"'it\'s'"#);
    }

    #[test]
    fn test_string_unterminated() {
        assert_eq!(
            error_kind("import \"./app"),
            LexerErrorKind::UnterminatedString
        );
    }

    #[test]
    fn test_quotes_are_plain_in_body() {
        assert_eq!(
            body("don't"),
            vec![
                (TokenKind::Text, "don".to_string()),
                (TokenKind::Unknown, "'".to_string()),
                (TokenKind::Text, "t".to_string()),
            ]
        );
    }

    // =========================================================================
    // Tags
    // =========================================================================

    #[test]
    fn test_tag_classification() {
        let k: Vec<_> = body("<!DOCTYPE html><div class=\"a\"><br/></div>")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            k,
            vec![
                TokenKind::Doctype,
                TokenKind::OpeningTag,
                TokenKind::SelfClosingTag,
                TokenKind::ClosingTag,
            ]
        );
    }

    #[test]
    fn test_tag_missing_close() {
        assert_eq!(error_kind("serve (<div"), LexerErrorKind::UnterminatedTag);
    }

    #[test]
    fn test_style_content_is_raw() {
        assert_eq!(
            body("<style>p { color: red; } @(x) @if</style>"),
            vec![
                (TokenKind::OpeningTag, "<style>".to_string()),
                (TokenKind::Text, "p { color: red; } @(x) @if".to_string()),
                (TokenKind::ClosingTag, "</style>".to_string()),
            ]
        );
    }

    #[test]
    fn test_script_with_attributes_is_raw() {
        assert_eq!(
            body("<script type=\"module\">let a = (1);</SCRIPT>"),
            vec![
                (TokenKind::OpeningTag, "<script type=\"module\">".to_string()),
                (TokenKind::Text, "let a = (1);".to_string()),
                (TokenKind::ClosingTag, "</SCRIPT>".to_string()),
            ]
        );
    }

    // =========================================================================
    // Parameters and function calls
    // =========================================================================

    #[test]
    fn test_parameter_expression() {
        assert_eq!(
            body("@(user.name)!"),
            vec![
                (TokenKind::ParameterExpression, "@(user.name)".to_string()),
                (TokenKind::Unknown, "!".to_string()),
            ]
        );
    }

    #[test]
    fn test_parameter_unterminated() {
        assert_eq!(
            error_kind("serve (@(user"),
            LexerErrorKind::UnterminatedParameter
        );
    }

    #[test]
    fn test_function_call() {
        assert_eq!(
            body("@upper(\"hi)\")"),
            vec![(TokenKind::FunctionCall, "@upper(\"hi)\")".to_string())]
        );
    }

    #[test]
    fn test_nested_function_call() {
        assert_eq!(
            body("@pow(sum(2, 3), 2)"),
            vec![(TokenKind::FunctionCall, "@pow(sum(2, 3), 2)".to_string())]
        );
    }

    #[test]
    fn test_lone_at_is_unknown() {
        assert_eq!(
            body("a@b"),
            vec![
                (TokenKind::Text, "a".to_string()),
                (TokenKind::Unknown, "@".to_string()),
                (TokenKind::Text, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_unclosed_call_rolls_back() {
        assert_eq!(
            body("@foo(bar"),
            vec![
                (TokenKind::Unknown, "@".to_string()),
                (TokenKind::Text, "foo".to_string()),
                (TokenKind::LParen, "(".to_string()),
                (TokenKind::Text, "bar".to_string()),
            ]
        );
    }

    // =========================================================================
    // Control constructs
    // =========================================================================

    #[test]
    fn test_if_else() {
        assert_eq!(
            body("@if (a == 1) { yes } @else { no }"),
            vec![
                (TokenKind::Keyword(Keyword::If), "@if".to_string()),
                (TokenKind::Condition, "(a==1)".to_string()),
                (TokenKind::CodeBlock, " yes ".to_string()),
                (TokenKind::Escape, " ".to_string()),
                (TokenKind::Keyword(Keyword::Else), "@else".to_string()),
                (TokenKind::CodeBlock, " no ".to_string()),
            ]
        );
    }

    #[test]
    fn test_condition_keeps_spaces_in_strings() {
        let toks = body("@if (name == \"John Doe\") {}");
        assert_eq!(toks[1].1, "(name==\"John Doe\")");
    }

    #[test]
    fn test_condition_nested_parens() {
        let toks = body("@if ((a || b) && check(c)) {x}");
        assert_eq!(toks[1].1, "((a||b)&&check(c))");
        assert_eq!(toks[2], (TokenKind::CodeBlock, "x".to_string()));
    }

    #[test]
    fn test_if_requires_paren() {
        assert_eq!(
            error_kind("serve (@if x {})"),
            LexerErrorKind::MissingParen(Keyword::If)
        );
    }

    #[test]
    fn test_if_condition_unterminated() {
        assert_eq!(
            error_kind("serve (@if (a {}"),
            LexerErrorKind::UnterminatedParen
        );
    }

    #[test]
    fn test_keyword_prefix_is_not_keyword() {
        assert_eq!(
            body("@iffy"),
            vec![
                (TokenKind::Unknown, "@".to_string()),
                (TokenKind::Text, "iffy".to_string()),
            ]
        );
    }

    #[test]
    fn test_each() {
        assert_eq!(
            body("@each (users : u) {<li>@(u)</li>}"),
            vec![
                (TokenKind::Keyword(Keyword::Each), "@each".to_string()),
                (TokenKind::EachExpression, "(users:u)".to_string()),
                (TokenKind::CodeBlock, "<li>@(u)</li>".to_string()),
            ]
        );
    }

    #[test]
    fn test_code_block_nested_braces() {
        let toks = body("@if (x) { a { b } c }");
        assert_eq!(toks[2].1, " a { b } c ");
    }

    #[test]
    fn test_code_block_unterminated() {
        assert_eq!(
            error_kind("serve (@if (x) { open"),
            LexerErrorKind::UnterminatedBlock
        );
    }

    #[test]
    fn test_function_declaration_body() {
        let toks: Vec<_> = tokens("fn add(a, b) { return \"}\" + a + b; }")
            .into_iter()
            .filter(|t| t.kind != TokenKind::Escape)
            .map(|t| (t.kind, t.value))
            .collect();
        assert_eq!(
            toks,
            vec![
                (TokenKind::Keyword(Keyword::Fn), "fn".to_string()),
                (TokenKind::Text, "add".to_string()),
                (TokenKind::LParen, "(".to_string()),
                (TokenKind::Text, "a".to_string()),
                (TokenKind::Unknown, ",".to_string()),
                (TokenKind::Text, "b".to_string()),
                (TokenKind::RParen, ")".to_string()),
                (
                    TokenKind::CodeBlock,
                    " return \"}\" + a + b; ".to_string()
                ),
            ]
        );
    }

    // =========================================================================
    // Positions and losslessness
    // =========================================================================

    #[test]
    fn test_positions_around_newline() {
        let toks = tokens("serve (\n  x)");
        assert_eq!((toks[0].span.line, toks[0].span.column), (1, 6));
        assert_eq!((toks[1].span.line, toks[1].span.column), (1, 6));
        assert_eq!((toks[2].span.line, toks[2].span.column), (1, 7));
        assert_eq!(toks[3].value, "\n");
        assert_eq!((toks[3].span.line, toks[3].span.column), (2, 1));
        assert_eq!((toks[4].span.line, toks[4].span.column), (2, 2));
    }

    #[test]
    fn test_plain_markup_is_lossless() {
        let source = "serve (\n<div class=\"card\">\n  <h1>Hi, there!</h1>\n</div>\n)";
        let joined: String = tokens(source).into_iter().map(|t| t.value).collect();
        assert_eq!(joined, source);
    }

    #[test]
    fn test_error_location_display() {
        let err = Scanner::tokenize("import \"x", "my file.zare").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Template Error: at file:///my%20file.zare:1:9 String literal was not closed"
        );
    }
}
