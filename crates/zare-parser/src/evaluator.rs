//! Sandboxed interpreter for `@if` conditions and `fn` bodies.
//!
//! Values are `serde_json::Value`s with JavaScript coercion rules applied
//! (see `coerce`). Free identifiers resolve through an [`Environment`],
//! which the template parser backs with its parameter bag and function scope.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::ast::{
    BinaryOp, DeclKind, ExprKind, Expression, PostfixOp, Statement, UnaryOp,
};
use crate::coerce::{
    compare, format_number, loose_eq, number_value, parse_float, parse_int, strict_eq,
    to_display, to_number, truthy, type_of, NULL,
};
use crate::expr_lexer::ExprLexerError;
use crate::expr_parser::{ExprParseError, ExprParser};
use crate::function::Function;
use crate::modules::{math, string};

/// Nested script function calls allowed before evaluation is aborted.
pub const MAX_CALL_DEPTH: usize = 64;

/// Expression evaluation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Lexer(#[from] ExprLexerError),

    #[error(transparent)]
    Parse(#[from] ExprParseError),

    #[error("{0} is not a function")]
    NotAFunction(String),

    #[error("Assignment to constant variable '{0}'")]
    ConstAssignment(String),

    #[error("Cannot set property '{property}' of {target}")]
    InvalidAssignment { property: String, target: String },

    #[error("{0}")]
    Type(String),

    #[error("Maximum call stack size exceeded")]
    CallDepth,
}

/// Where free identifiers and function names are looked up.
pub trait Environment {
    /// Value of a bare identifier, if bound.
    fn variable(&self, name: &str) -> Option<Value>;

    /// Value of an `@(path)` reference.
    fn parameter(&self, path: &str) -> Option<Value>;

    /// A declared or module function.
    fn function(&self, name: &str) -> Option<Rc<Function>>;
}

/// An environment with nothing bound.
pub struct EmptyEnvironment;

impl Environment for EmptyEnvironment {
    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }

    fn parameter(&self, _path: &str) -> Option<Value> {
        None
    }

    fn function(&self, _name: &str) -> Option<Rc<Function>> {
        None
    }
}

/// Parse and evaluate a single expression.
pub fn evaluate(source: &str, env: &dyn Environment) -> Result<Value, EvalError> {
    let expression = ExprParser::parse(source)?;
    Evaluator::new(env).eval(&expression)
}

struct Local {
    name: String,
    value: Value,
    kind: DeclKind,
}

enum Flow {
    Normal,
    Return(Value),
}

/// Tree-walking evaluator with its own local bindings.
pub struct Evaluator<'e> {
    env: &'e dyn Environment,
    locals: Vec<Local>,
    depth: usize,
}

impl<'e> Evaluator<'e> {
    pub fn new(env: &'e dyn Environment) -> Self {
        Self::with_depth(env, 0)
    }

    pub(crate) fn with_depth(env: &'e dyn Environment, depth: usize) -> Self {
        Self {
            env,
            locals: Vec::new(),
            depth,
        }
    }

    /// Bind a function argument.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.declare(DeclKind::Let, name, value);
    }

    /// Run a statement list; the value of the first `return`, else null.
    pub fn run(&mut self, statements: &[Statement]) -> Result<Value, EvalError> {
        match self.exec_all(statements)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn exec_all(&mut self, statements: &[Statement]) -> Result<Flow, EvalError> {
        for statement in statements {
            if let Flow::Return(value) = self.exec(statement)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, statement: &Statement) -> Result<Flow, EvalError> {
        match statement {
            Statement::Declare { kind, name, value } => {
                let value = match value {
                    Some(expression) => self.eval(expression)?,
                    None => Value::Null,
                };
                self.declare(*kind, name, value);
                Ok(Flow::Normal)
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expression) => self.eval(expression)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Statement::If {
                condition,
                consequent,
                alternate,
            } => {
                if truthy(&self.eval(condition)?) {
                    self.exec_all(consequent)
                } else {
                    self.exec_all(alternate)
                }
            }
            Statement::Block(statements) => self.exec_all(statements),
            Statement::Expr(expression) => {
                self.eval(expression)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn declare(&mut self, kind: DeclKind, name: &str, value: Value) {
        match self.locals.iter_mut().find(|local| local.name == name) {
            Some(local) => {
                local.value = value;
                local.kind = kind;
            }
            None => self.locals.push(Local {
                name: name.to_string(),
                value,
                kind,
            }),
        }
    }

    fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().find(|local| local.name == name)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn eval(&mut self, expression: &Expression) -> Result<Value, EvalError> {
        match &expression.kind {
            ExprKind::Number(n) => Ok(number_value(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Boolean(b) => Ok(Value::Bool(*b)),
            ExprKind::Null | ExprKind::Undefined => Ok(Value::Null),
            ExprKind::Identifier(name) => Ok(self.identifier(name)),
            ExprKind::ParamRef(path) => Ok(self.env.parameter(path).unwrap_or(Value::Null)),
            ExprKind::Binary { left, op, right } => self.binary(left, *op, right),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!truthy(&value)),
                    UnaryOp::Neg => number_value(-to_number(&value)),
                    UnaryOp::Plus => number_value(to_number(&value)),
                    UnaryOp::Typeof => Value::String(type_of(&value).to_string()),
                })
            }
            ExprKind::Postfix { operand, op } => {
                let old = to_number(&self.eval(operand)?);
                let new = match op {
                    PostfixOp::Increment => old + 1.0,
                    PostfixOp::Decrement => old - 1.0,
                };
                self.assign(operand, number_value(new))?;
                Ok(number_value(old))
            }
            ExprKind::Member {
                object, property, ..
            } => {
                if let Some(value) = self.math_constant(object, property) {
                    return Ok(value);
                }
                let target = self.eval(object)?;
                let key = self.property_key(property)?;
                Ok(get_property(&target, &key))
            }
            ExprKind::Call { callee, arguments } => {
                let args = arguments
                    .iter()
                    .map(|argument| self.eval(argument))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
            ExprKind::Ternary {
                condition,
                consequent,
                alternate,
            } => {
                if truthy(&self.eval(condition)?) {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            ExprKind::Object(properties) => {
                let mut map = Map::new();
                for property in properties {
                    let value = self.eval(&property.value)?;
                    map.insert(property.key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            ExprKind::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            )),
            ExprKind::Assignment { target, op, value } => {
                let rhs = self.eval(value)?;
                let result = match op.binary() {
                    None => rhs,
                    Some(binary) => {
                        let current = self.eval(target)?;
                        apply_binary(binary, &current, &rhs)
                    }
                };
                self.assign(target, result.clone())?;
                Ok(result)
            }
        }
    }

    fn identifier(&self, name: &str) -> Value {
        if let Some(local) = self.local(name) {
            return local.value.clone();
        }
        if let Some(value) = self.env.variable(name) {
            return value;
        }
        match name {
            "NaN" => number_value(f64::NAN),
            "Infinity" => number_value(f64::INFINITY),
            _ => Value::Null,
        }
    }

    /// Whether `name` refers to something other than a global object.
    fn is_bound(&self, name: &str) -> bool {
        self.local(name).is_some() || self.env.variable(name).is_some()
    }

    fn binary(
        &mut self,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
    ) -> Result<Value, EvalError> {
        let lhs = self.eval(left)?;
        match op {
            BinaryOp::And if !truthy(&lhs) => return Ok(lhs),
            BinaryOp::Or if truthy(&lhs) => return Ok(lhs),
            BinaryOp::NullishCoalescing if !lhs.is_null() => return Ok(lhs),
            BinaryOp::And | BinaryOp::Or | BinaryOp::NullishCoalescing => {
                return self.eval(right)
            }
            _ => {}
        }
        let rhs = self.eval(right)?;
        Ok(apply_binary(op, &lhs, &rhs))
    }

    fn property_key(&mut self, property: &Expression) -> Result<String, EvalError> {
        match &property.kind {
            ExprKind::String(name) => Ok(name.clone()),
            _ => Ok(to_display(&self.eval(property)?)),
        }
    }

    fn math_constant(&self, object: &Expression, property: &Expression) -> Option<Value> {
        let (ExprKind::Identifier(name), ExprKind::String(constant)) = (&object.kind, &property.kind)
        else {
            return None;
        };
        if name != "Math" || self.is_bound(name) {
            return None;
        }
        let module_name = match constant.as_str() {
            "SQRT1_2" => "SQRT12",
            other => other,
        };
        if !module_name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return None;
        }
        math::lookup(module_name).and_then(|f| f(&[]).ok())
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call(&mut self, callee: &Expression, args: Vec<Value>) -> Result<Value, EvalError> {
        match &callee.kind {
            ExprKind::Identifier(name) => {
                if self.local(name).is_none() {
                    if let Some(function) = self.env.function(name) {
                        return self.invoke(&function, &args);
                    }
                    if let Some(result) = call_global(name, &args) {
                        return result;
                    }
                }
                Err(EvalError::NotAFunction(name.clone()))
            }
            ExprKind::Member {
                object, property, ..
            } => {
                let method = self.property_key(property)?;
                if matches!(&object.kind, ExprKind::Identifier(name) if name == "Math")
                    && !self.is_bound("Math")
                {
                    return call_math(&method, &args);
                }
                let receiver = self.eval(object)?;
                call_method(&receiver, &method, &args)
            }
            _ => Err(EvalError::NotAFunction("expression".to_string())),
        }
    }

    fn invoke(&mut self, function: &Function, args: &[Value]) -> Result<Value, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepth);
        }
        function.call_at(args, self.env, self.depth + 1)
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    fn assign(&mut self, target: &Expression, value: Value) -> Result<(), EvalError> {
        let mut keys = Vec::new();
        let mut root = target;
        while let ExprKind::Member {
            object, property, ..
        } = &root.kind
        {
            keys.push(self.property_key(property)?);
            root = object;
        }
        keys.reverse();

        let ExprKind::Identifier(name) = &root.kind else {
            return Err(EvalError::InvalidAssignment {
                property: keys.last().cloned().unwrap_or_default(),
                target: "expression".to_string(),
            });
        };

        if keys.is_empty() {
            return match self.locals.iter_mut().find(|local| local.name == *name) {
                Some(local) if local.kind == DeclKind::Const => {
                    Err(EvalError::ConstAssignment(name.clone()))
                }
                Some(local) => {
                    local.value = value;
                    Ok(())
                }
                None => {
                    self.declare(DeclKind::Var, name, value);
                    Ok(())
                }
            };
        }

        // Mutating a parameter's member copies it into a local first.
        if self.local(name).is_none() {
            let current = self.identifier(name);
            self.declare(DeclKind::Var, name, current);
        }
        let Some(local) = self.locals.iter_mut().find(|local| local.name == *name) else {
            return Err(EvalError::Type(format!("{name} is not defined")));
        };

        let Some((last, path)) = keys.split_last() else {
            return Ok(());
        };
        let mut slot = &mut local.value;
        for key in path {
            slot = match slot {
                Value::Object(map) => map.get_mut(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
                _ => None,
            }
            .ok_or_else(|| EvalError::InvalidAssignment {
                property: key.clone(),
                target: "undefined".to_string(),
            })?;
        }

        match slot {
            Value::Object(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            Value::Array(items) => match last.parse::<usize>() {
                Ok(index) => {
                    if index >= items.len() {
                        items.resize(index + 1, Value::Null);
                    }
                    items[index] = value;
                    Ok(())
                }
                Err(_) => Err(EvalError::InvalidAssignment {
                    property: last.clone(),
                    target: "an array".to_string(),
                }),
            },
            other => Err(EvalError::InvalidAssignment {
                property: last.clone(),
                target: type_of(other).to_string(),
            }),
        }
    }
}

// =============================================================================
// Operators and property access
// =============================================================================

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let numeric = |f: fn(f64, f64) -> f64| number_value(f(to_number(lhs), to_number(rhs)));
    match op {
        BinaryOp::Add => {
            let concatenates = |v: &Value| matches!(type_of(v), "string" | "object");
            if concatenates(lhs) || concatenates(rhs) {
                Value::String(format!("{}{}", to_display(lhs), to_display(rhs)))
            } else {
                numeric(|a, b| a + b)
            }
        }
        BinaryOp::Sub => numeric(|a, b| a - b),
        BinaryOp::Mul => numeric(|a, b| a * b),
        BinaryOp::Div => numeric(|a, b| a / b),
        BinaryOp::Mod => numeric(|a, b| a % b),
        BinaryOp::Eq => Value::Bool(loose_eq(lhs, rhs)),
        BinaryOp::Neq => Value::Bool(!loose_eq(lhs, rhs)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(lhs, rhs)),
        BinaryOp::StrictNeq => Value::Bool(!strict_eq(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_lt())),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_gt())),
        BinaryOp::Lte => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_le())),
        BinaryOp::Gte => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_ge())),
        // Short-circuiting operators are handled before both sides are known.
        BinaryOp::And => if truthy(lhs) { rhs.clone() } else { lhs.clone() },
        BinaryOp::Or => if truthy(lhs) { lhs.clone() } else { rhs.clone() },
        BinaryOp::NullishCoalescing => if lhs.is_null() { rhs.clone() } else { lhs.clone() },
    }
}

/// `target[key]`. Missing properties and property reads on null are null.
fn get_property(target: &Value, key: &str) -> Value {
    match target {
        Value::String(s) => match key {
            "length" => Value::from(s.chars().count()),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Null, |c| Value::String(c.to_string())),
        },
        Value::Array(items) => match key {
            "length" => Value::from(items.len()),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null),
        },
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn call_global(name: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
    let first = args.first().unwrap_or(&NULL);
    let value = match name {
        "Number" => number_value(args.first().map_or(0.0, to_number)),
        "String" => Value::String(args.first().map_or_else(String::new, to_display)),
        "Boolean" => Value::Bool(truthy(first)),
        "parseInt" => number_value(parse_int(first)),
        "parseFloat" => number_value(parse_float(first)),
        "isNaN" => Value::Bool(to_number(first).is_nan()),
        _ => return None,
    };
    Some(Ok(value))
}

fn call_math(method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let fold = |init: f64, pick: fn(f64, f64) -> f64| {
        let mut result = init;
        for n in args.iter().map(to_number) {
            if n.is_nan() {
                return number_value(f64::NAN);
            }
            result = pick(result, n);
        }
        number_value(result)
    };
    match method {
        "max" => Ok(fold(f64::NEG_INFINITY, f64::max)),
        "min" => Ok(fold(f64::INFINITY, f64::min)),
        _ => match math::lookup(method) {
            Some(function) if method.starts_with(|c: char| c.is_ascii_lowercase()) => {
                function(args)
            }
            _ => Err(EvalError::NotAFunction(format!("Math.{method}"))),
        },
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let arg = |i: usize| args.get(i).unwrap_or(&NULL);
    let not_a_function = || EvalError::NotAFunction(format!("{}.{method}", type_of(receiver)));

    match receiver {
        Value::String(s) if type_of(receiver) == "string" => {
            string::method(s, method, args).ok_or_else(not_a_function)?
        }
        Value::Array(items) => match method {
            "join" => {
                let separator = match arg(0) {
                    Value::Null => ",".to_string(),
                    other => to_display(other),
                };
                Ok(Value::String(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Null => String::new(),
                            other => to_display(other),
                        })
                        .collect::<Vec<_>>()
                        .join(&separator),
                ))
            }
            "includes" => Ok(Value::Bool(items.iter().any(|item| strict_eq(item, arg(0))))),
            "indexOf" => Ok(Value::from(
                items
                    .iter()
                    .position(|item| strict_eq(item, arg(0)))
                    .map_or(-1, |i| i as i64),
            )),
            "at" => {
                let index = relative_index(to_number(arg(0)), items.len());
                Ok(index.and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null))
            }
            "slice" => {
                let (start, end) = slice_bounds(args, items.len());
                Ok(Value::Array(items[start..end.max(start)].to_vec()))
            }
            "concat" => {
                let mut joined = items.clone();
                for value in args {
                    match value {
                        Value::Array(more) => joined.extend(more.iter().cloned()),
                        other => joined.push(other.clone()),
                    }
                }
                Ok(Value::Array(joined))
            }
            "toString" => Ok(Value::String(to_display(receiver))),
            _ => Err(not_a_function()),
        },
        _ => match method {
            "toFixed" => crate::modules::number::to_fixed(&[receiver.clone(), arg(0).clone()]),
            "toString" => Ok(Value::String(match receiver {
                Value::Number(n) => format_number(n.as_f64().unwrap_or(f64::NAN)),
                other => to_display(other),
            })),
            _ => Err(not_a_function()),
        },
    }
}

/// Resolve a possibly negative index against `len`.
pub(crate) fn relative_index(index: f64, len: usize) -> Option<usize> {
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    let resolved = if index < 0.0 { len as f64 + index } else { index };
    (resolved >= 0.0 && resolved < len as f64).then_some(resolved as usize)
}

/// `slice(start, end)` bounds clamped to `len`; negatives count from the end.
pub(crate) fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let clamp = |value: Option<&Value>, default: usize| -> usize {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return default;
        };
        let n = to_number(value);
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        let resolved = if n < 0.0 { len as f64 + n } else { n };
        resolved.clamp(0.0, len as f64) as usize
    };
    (clamp(args.first(), 0), clamp(args.get(1), len))
}
