use zare_lexer::Token;

/// An entry awaiting its closing counterpart.
#[derive(Debug, Clone, PartialEq)]
pub enum Open {
    Paren(Token),
    Tag { name: String, token: Token },
}

impl Open {
    pub fn token(&self) -> &Token {
        match self {
            Open::Paren(token) | Open::Tag { token, .. } => token,
        }
    }

    /// How the entry reads in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Open::Paren(_) => "(".to_string(),
            Open::Tag { name, .. } => format!("<{name}>"),
        }
    }
}

/// LIFO of open parens and tags, used for balance checking.
#[derive(Debug, Default)]
pub struct Stack {
    entries: Vec<Open>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Open) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<Open> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<&Open> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
