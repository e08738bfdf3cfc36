//! Expression parser for Zare.
//!
//! Parses expression token streams (from `expr_lexer`) into `Expression` and
//! `Statement` nodes. Recursive descent for statements, Pratt parsing for
//! binary operator precedence.

use crate::ast::{
    AssignOp, BinaryOp, DeclKind, ExprKind, ExprSpan, Expression, ObjectProperty, PostfixOp,
    Statement, UnaryOp,
};
use crate::expr_lexer::{ExprLexer, ExprLexerError, Token, TokenKind, TokenValue};

/// Expression parser error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprParseError {
    #[error(transparent)]
    Lexer(#[from] ExprLexerError),

    #[error("Unexpected token {found:?} at position {}, expected {expected}", span.start)]
    Unexpected {
        found: TokenKind,
        expected: &'static str,
        span: ExprSpan,
    },

    #[error("Invalid assignment target at position {}", span.start)]
    InvalidTarget { span: ExprSpan },
}

/// Zare expression parser.
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    /// Create a new expression parser for the given tokens. The token list
    /// must end with `Eof`, as `ExprLexer::tokenize` produces.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a single expression (an `@if` condition).
    pub fn parse(source: &str) -> Result<Expression, ExprParseError> {
        let mut parser = ExprParser::new(ExprLexer::tokenize(source)?);
        let expression = parser.expression()?;
        parser.expect(TokenKind::Eof, "end of expression")?;
        Ok(expression)
    }

    /// Parse a statement list (a `fn` body).
    pub fn parse_program(source: &str) -> Result<Vec<Statement>, ExprParseError> {
        let mut parser = ExprParser::new(ExprLexer::tokenize(source)?);
        let mut statements = Vec::new();
        while !parser.check(TokenKind::Eof) {
            if let Some(statement) = parser.statement()? {
                statements.push(statement);
            }
        }
        Ok(statements)
    }

    // --- Statements ---

    fn statement(&mut self) -> Result<Option<Statement>, ExprParseError> {
        if self.eat(TokenKind::Semicolon) {
            return Ok(None);
        }
        if self.check(TokenKind::LBrace) {
            return Ok(Some(Statement::Block(self.block()?)));
        }

        let keyword = match &self.current().value {
            TokenValue::Identifier(name) if self.check(TokenKind::Identifier) => {
                Some(name.clone())
            }
            _ => None,
        };

        let statement = match keyword.as_deref() {
            Some("let") => self.declaration(DeclKind::Let)?,
            Some("const") => self.declaration(DeclKind::Const)?,
            Some("var") => self.declaration(DeclKind::Var)?,
            Some("return") => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.expression()?)
                };
                Statement::Return(value)
            }
            Some("if") => {
                self.advance();
                self.expect(TokenKind::LParen, "'(' after if")?;
                let condition = self.expression()?;
                self.expect(TokenKind::RParen, "')' after condition")?;
                let consequent = self.branch()?;
                let alternate = if self.eat_identifier("else") {
                    self.branch()?
                } else {
                    Vec::new()
                };
                return Ok(Some(Statement::If {
                    condition,
                    consequent,
                    alternate,
                }));
            }
            _ => Statement::Expr(self.expression()?),
        };

        self.eat(TokenKind::Semicolon);
        Ok(Some(statement))
    }

    fn declaration(&mut self, kind: DeclKind) -> Result<Statement, ExprParseError> {
        self.advance();
        let mut declarations = Vec::new();
        loop {
            let name = self.identifier("a binding name")?;
            let value = if self.eat(TokenKind::Eq) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarations.push(Statement::Declare { kind, name, value });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(match declarations.len() {
            1 => declarations.remove(0),
            _ => Statement::Block(declarations),
        })
    }

    /// `{ … }` or a single statement.
    fn branch(&mut self) -> Result<Vec<Statement>, ExprParseError> {
        if self.check(TokenKind::LBrace) {
            return self.block();
        }
        Ok(self.statement()?.into_iter().collect())
    }

    fn block(&mut self) -> Result<Vec<Statement>, ExprParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected("'}'"));
            }
            if let Some(statement) = self.statement()? {
                statements.push(statement);
            }
        }
        self.advance();
        Ok(statements)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        )
    }

    // --- Expressions ---

    fn expression(&mut self) -> Result<Expression, ExprParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expression, ExprParseError> {
        let target = self.ternary()?;

        let op = match self.current().kind {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            TokenKind::StarEq => AssignOp::MulAssign,
            TokenKind::SlashEq => AssignOp::DivAssign,
            _ => return Ok(target),
        };

        if !matches!(
            target.kind,
            ExprKind::Identifier(_) | ExprKind::Member { .. }
        ) {
            return Err(ExprParseError::InvalidTarget { span: target.span });
        }

        self.advance();
        let value = self.assignment()?;
        let span = target.span.to(value.span);
        Ok(Expression::new(
            ExprKind::Assignment {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn ternary(&mut self) -> Result<Expression, ExprParseError> {
        let condition = self.binary(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(condition);
        }
        let consequent = self.assignment()?;
        self.expect(TokenKind::Colon, "':' in conditional")?;
        let alternate = self.assignment()?;
        let span = condition.span.to(alternate.span);
        Ok(Expression::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expression, ExprParseError> {
        let mut left = self.unary()?;

        while let Some(op) = binary_op(self.current().kind) {
            let precedence = op.precedence();
            if precedence <= min_precedence {
                break;
            }
            self.advance();
            let right = self.binary(precedence)?;
            let span = left.span.to(right.span);
            left = Expression::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, ExprParseError> {
        let op = match self.current().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            _ => return self.postfix(),
        };
        let start = self.current().span;
        self.advance();
        let operand = self.unary()?;
        let span = start.to(operand.span);
        Ok(Expression::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn postfix(&mut self) -> Result<Expression, ExprParseError> {
        let mut expression = self.primary()?;

        loop {
            match self.current().kind {
                TokenKind::Dot | TokenKind::OptionalChain => {
                    let optional = self.check(TokenKind::OptionalChain);
                    self.advance();
                    let property = self.property_name()?;
                    expression = member(expression, property, false, optional);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expression = member(expression, property, true, false);
                }
                TokenKind::LParen => {
                    self.advance();
                    let arguments = self.list(TokenKind::RParen, Self::assignment)?;
                    let end = self.previous_span();
                    let span = expression.span.to(end);
                    expression = Expression::new(
                        ExprKind::Call {
                            callee: Box::new(expression),
                            arguments,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if self.check(TokenKind::PlusPlus) {
                        PostfixOp::Increment
                    } else {
                        PostfixOp::Decrement
                    };
                    let span = expression.span.to(self.current().span);
                    self.advance();
                    return Ok(Expression::new(
                        ExprKind::Postfix {
                            operand: Box::new(expression),
                            op,
                        },
                        span,
                    ));
                }
                _ => return Ok(expression),
            }
        }
    }

    fn primary(&mut self) -> Result<Expression, ExprParseError> {
        let token = self.current().clone();
        let kind = match (token.kind, token.value) {
            (TokenKind::Number, TokenValue::Number(n)) => ExprKind::Number(n),
            (TokenKind::String, TokenValue::String(s)) => ExprKind::String(s),
            (TokenKind::ParamRef, TokenValue::String(path)) => ExprKind::ParamRef(path),
            (TokenKind::Boolean, TokenValue::Boolean(b)) => ExprKind::Boolean(b),
            (TokenKind::Null, _) => ExprKind::Null,
            (TokenKind::Undefined, _) => ExprKind::Undefined,
            (TokenKind::Identifier, TokenValue::Identifier(name)) => ExprKind::Identifier(name),
            (TokenKind::LParen, _) => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            (TokenKind::LBracket, _) => {
                self.advance();
                let items = self.list(TokenKind::RBracket, Self::assignment)?;
                let span = token.span.to(self.previous_span());
                return Ok(Expression::new(ExprKind::Array(items), span));
            }
            (TokenKind::LBrace, _) => {
                self.advance();
                let properties = self.list(TokenKind::RBrace, Self::object_property)?;
                let span = token.span.to(self.previous_span());
                return Ok(Expression::new(ExprKind::Object(properties), span));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expression::new(kind, token.span))
    }

    fn object_property(&mut self) -> Result<ObjectProperty, ExprParseError> {
        let token = self.current().clone();
        let key = match token.value {
            TokenValue::Identifier(name) => name,
            TokenValue::String(s) if token.kind == TokenKind::String => s,
            TokenValue::Number(n) => crate::coerce::format_number(n),
            _ => return Err(self.unexpected("a property name")),
        };
        self.advance();

        if self.eat(TokenKind::Colon) {
            let value = self.assignment()?;
            return Ok(ObjectProperty {
                key,
                value,
                shorthand: false,
            });
        }

        Ok(ObjectProperty {
            value: Expression::new(ExprKind::Identifier(key.clone()), token.span),
            key,
            shorthand: true,
        })
    }

    /// Comma separated items up to `close`, which is consumed. Trailing
    /// commas are allowed.
    fn list<T>(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> Result<T, ExprParseError>,
    ) -> Result<Vec<T>, ExprParseError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(item(self)?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, "closing delimiter")?;
        Ok(items)
    }

    /// After `.`: any identifier-like word, including literals like `null`.
    fn property_name(&mut self) -> Result<Expression, ExprParseError> {
        let token = self.current().clone();
        let name = match (token.kind, token.value) {
            (_, TokenValue::Identifier(name)) => name,
            (TokenKind::Boolean, TokenValue::Boolean(b)) => b.to_string(),
            (TokenKind::Null, _) => "null".to_string(),
            (TokenKind::Undefined, _) => "undefined".to_string(),
            (TokenKind::Typeof, _) => "typeof".to_string(),
            _ => return Err(self.unexpected("a property name")),
        };
        self.advance();
        Ok(Expression::new(ExprKind::String(name), token.span))
    }

    // --- Token helpers ---

    fn current(&self) -> &Token {
        // `tokenize` always ends the stream with `Eof`, which is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous_span(&self) -> ExprSpan {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) {
        if !self.check(TokenKind::Eof) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_identifier(&mut self, word: &str) -> bool {
        let matches = matches!(&self.current().value, TokenValue::Identifier(name) if name == word);
        if matches {
            self.advance();
        }
        matches
    }

    fn identifier(&mut self, expected: &'static str) -> Result<String, ExprParseError> {
        match &self.current().value {
            TokenValue::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), ExprParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ExprParseError {
        let token = self.current();
        ExprParseError::Unexpected {
            found: token.kind,
            expected,
            span: token.span,
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Neq,
        TokenKind::StrictEq => BinaryOp::StrictEq,
        TokenKind::StrictNotEq => BinaryOp::StrictNeq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Lte => BinaryOp::Lte,
        TokenKind::Gte => BinaryOp::Gte,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::QuestionQuestion => BinaryOp::NullishCoalescing,
        _ => return None,
    })
}

fn member(object: Expression, property: Expression, computed: bool, optional: bool) -> Expression {
    let span = object.span.to(property.span);
    Expression::new(
        ExprKind::Member {
            object: Box::new(object),
            property: Box::new(property),
            computed,
            optional,
        },
        span,
    )
}
