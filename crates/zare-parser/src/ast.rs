//! Abstract syntax tree for Zare expressions and function bodies.
//!
//! Templates themselves are rendered straight from the token stream; only
//! `@if` conditions and `fn` bodies are parsed into a tree.

// =========================================================================
// Statements
// =========================================================================

/// How a local binding was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

/// A statement inside a `fn` body.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let x = 1;`, `const y;`
    Declare {
        kind: DeclKind,
        name: String,
        value: Option<Expression>,
    },

    /// `return expr;`
    Return(Option<Expression>),

    /// `if (cond) { … } else { … }`
    If {
        condition: Expression,
        consequent: Vec<Statement>,
        alternate: Vec<Statement>,
    },

    /// A bare `{ … }` block.
    Block(Vec<Statement>),

    /// An expression evaluated for its effect.
    Expr(Expression),
}

// =========================================================================
// Expressions
// =========================================================================

/// A position in expression text (relative to the expression string, not the
/// template). Named `ExprSpan` to keep it apart from `zare_lexer::Span`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprSpan {
    pub start: usize,
    pub end: usize,
}

impl ExprSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both.
    pub fn to(self, other: ExprSpan) -> ExprSpan {
        ExprSpan::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: ExprSpan,
}

impl Expression {
    pub fn new(kind: ExprKind, span: ExprSpan) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
    /// A local, a function name or a top-level parameter.
    Identifier(String),

    /// `@(user.name)`
    ParamRef(String),

    /// `price * qty`, `score >= 50`
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },

    /// `!user.admin`, `-n`, `typeof x`
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// `i++`, `i--`
    Postfix {
        operand: Box<Expression>,
        op: PostfixOp,
    },

    /// `user.name`, `rows[i]`, `user?.address`
    Member {
        object: Box<Expression>,
        property: Box<Expression>,
        computed: bool,
        optional: bool,
    },

    /// `sum(a, b)`, `title.toUpperCase()`
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },

    /// `stock ? 'in' : 'out'`
    Ternary {
        condition: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },

    /// `{ label, total: 0 }`
    Object(Vec<ObjectProperty>),

    Array(Vec<Expression>),

    /// `total += price`
    Assignment {
        target: Box<Expression>,
        op: AssignOp,
        value: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperty {
    pub key: String,
    pub value: Expression,
    pub shorthand: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    NullishCoalescing,
}

impl BinaryOp {
    /// Binding power for Pratt parsing; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::NullishCoalescing => 1,
            BinaryOp::Or => 2,
            BinaryOp::And => 3,
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::StrictEq | BinaryOp::StrictNeq => 4,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => 5,
            BinaryOp::Add | BinaryOp::Sub => 6,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}
