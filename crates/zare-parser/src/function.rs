use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::ast::Statement;
use crate::coerce::NULL;
use crate::evaluator::{EvalError, Environment, Evaluator};
use crate::expr_parser::ExprParser;
use crate::modules::Builtin;

/// A callable bound in a function scope.
#[derive(Clone)]
pub enum Function {
    /// A module function.
    Builtin { name: &'static str, call: Builtin },

    /// A `fn` declared in a template.
    Script {
        name: String,
        params: Vec<String>,
        body: Rc<Vec<Statement>>,
    },
}

impl Function {
    /// Compile a `fn` body.
    pub fn compile(
        name: impl Into<String>,
        params: Vec<String>,
        body: &str,
    ) -> Result<Self, EvalError> {
        Ok(Function::Script {
            name: name.into(),
            params,
            body: Rc::new(ExprParser::parse_program(body)?),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Builtin { name, .. } => name,
            Function::Script { name, .. } => name,
        }
    }

    /// Invoke with positional arguments. Missing arguments are null; extra
    /// ones are ignored.
    pub fn call(&self, args: &[Value], env: &dyn Environment) -> Result<Value, EvalError> {
        self.call_at(args, env, 0)
    }

    pub(crate) fn call_at(
        &self,
        args: &[Value],
        env: &dyn Environment,
        depth: usize,
    ) -> Result<Value, EvalError> {
        match self {
            Function::Builtin { call, .. } => call(args),
            Function::Script { params, body, .. } => {
                let mut evaluator = Evaluator::with_depth(env, depth);
                for (i, param) in params.iter().enumerate() {
                    evaluator.bind(param, args.get(i).unwrap_or(&NULL).clone());
                }
                evaluator.run(body)
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin { name, .. } => write!(f, "Builtin({name})"),
            Function::Script { name, params, .. } => {
                write!(f, "Script({name}({}))", params.join(", "))
            }
        }
    }
}
