//! `@name(arg, …)` template calls.
//!
//! Arguments are not full expressions: each one is a number, a parameter
//! path, a nested call, a quoted string, or raw text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::coerce::{number_value, to_number};
use crate::evaluator::{EvalError, Environment};
use crate::params::unquote;

static CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^@?([A-Za-z0-9_]+)\s*\((.*)\)$").unwrap());
static NESTED_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^[A-Za-z_]\w*\s*\(.*\)$").unwrap());
static PARAMETER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").unwrap());

/// A call with its arguments evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Value>,
}

/// Split `@name(inside)` into the name and the raw argument text.
pub fn split_call(value: &str) -> Option<(&str, &str)> {
    let captures = CALL.captures(value.trim())?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Split argument text on top-level commas. Commas nested in `()[]{}` or in
/// quotes do not split; a quote preceded by a backslash does not toggle the
/// quote state. A trailing empty argument is dropped.
pub fn split_arguments(inside: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut previous: Option<char> = None;

    for c in inside.chars() {
        match c {
            '"' | '\'' if previous != Some('\\') => {
                match quote {
                    Some(open) if open == c => quote = None,
                    None => quote = Some(c),
                    Some(_) => {}
                }
                current.push(c);
            }
            '(' | '[' | '{' if quote.is_none() => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' if quote.is_none() => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 && quote.is_none() => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
        previous = Some(c);
    }

    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Parse `@name(…)` and evaluate its arguments against `env`. `None` when
/// `value` does not have the shape of a call.
pub fn extract_function_call(
    value: &str,
    env: &dyn Environment,
) -> Result<Option<FunctionCall>, EvalError> {
    let Some((name, inside)) = split_call(value) else {
        return Ok(None);
    };
    let args = split_arguments(inside)
        .iter()
        .map(|arg| argument_value(arg, env))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(FunctionCall {
        name: name.to_string(),
        args,
    }))
}

/// Evaluate a call: extract it, look the function up and invoke it.
pub fn invoke_function_call(value: &str, env: &dyn Environment) -> Result<Value, EvalError> {
    let call = extract_function_call(value, env)?
        .ok_or_else(|| EvalError::NotAFunction(value.trim().to_string()))?;
    let function = env
        .function(&call.name)
        .ok_or_else(|| EvalError::NotAFunction(format!("`{}`", call.name)))?;
    function.call(&call.args, env)
}

fn argument_value(arg: &str, env: &dyn Environment) -> Result<Value, EvalError> {
    if is_number(arg) {
        return Ok(number_value(to_number(&Value::String(arg.to_string()))));
    }
    if PARAMETER_PATH.is_match(arg) {
        return Ok(match env.parameter(arg) {
            None | Some(Value::Null) => Value::String(String::new()),
            Some(value) => value,
        });
    }
    if NESTED_CALL.is_match(arg) {
        return invoke_function_call(arg, env);
    }
    if let Some(text) = unquote(arg).filter(|_| !arg.starts_with('`')) {
        return Ok(Value::String(text.to_string()));
    }
    Ok(Value::String(arg.to_string()))
}

fn is_number(arg: &str) -> bool {
    !arg.is_empty()
        && arg
            .strip_prefix(['-', '+'])
            .unwrap_or(arg)
            .starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && !to_number(&Value::String(arg.to_string())).is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EmptyEnvironment;
    use crate::function::Function;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};
    use std::rc::Rc;

    struct Env {
        params: Map<String, Value>,
        functions: Vec<(&'static str, Rc<Function>)>,
    }

    impl Environment for Env {
        fn variable(&self, name: &str) -> Option<Value> {
            self.params.get(name).cloned()
        }

        fn parameter(&self, path: &str) -> Option<Value> {
            crate::params::lookup(&self.params, path)
        }

        fn function(&self, name: &str) -> Option<Rc<Function>> {
            self.functions
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, f)| Rc::clone(f))
        }
    }

    fn env() -> Env {
        let sum = Function::compile(
            "sum",
            vec!["a".into(), "b".into()],
            "return Number(a) + Number(b)",
        )
        .unwrap();
        let pow = Function::Builtin {
            name: "pow",
            call: crate::modules::math::lookup("pow").unwrap(),
        };
        Env {
            params: json!({ "user": { "name": "Ada" }, "count": 0 })
                .as_object()
                .cloned()
                .unwrap(),
            functions: vec![("sum", Rc::new(sum)), ("pow", Rc::new(pow))],
        }
    }

    // =========================================================================
    // Splitting
    // =========================================================================

    #[test]
    fn test_split_call() {
        assert_eq!(split_call("@upper(\"Hello\")"), Some(("upper", "\"Hello\"")));
        assert_eq!(split_call("sum(1, 2)"), Some(("sum", "1, 2")));
        assert_eq!(split_call("@(user)"), None);
        assert_eq!(split_call("@upper"), None);
    }

    #[test]
    fn test_split_arguments_respects_nesting() {
        assert_eq!(
            split_arguments("sum(2, 3), [1, 2], { a: 1 }, 'x, y', \"q\\\", r\""),
            vec!["sum(2, 3)", "[1, 2]", "{ a: 1 }", "'x, y'", "\"q\\\", r\""]
        );
        assert_eq!(split_arguments(""), Vec::<String>::new());
        assert_eq!(split_arguments("a, , b"), vec!["a", "", "b"]);
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    #[test]
    fn test_extract_quoted_arguments() {
        let call = extract_function_call("@functionCall('arg1', 'arg2')", &EmptyEnvironment)
            .unwrap()
            .unwrap();
        assert_eq!(
            call,
            FunctionCall {
                name: "functionCall".into(),
                args: vec![json!("arg1"), json!("arg2")],
            }
        );
    }

    #[test]
    fn test_argument_classification() {
        let call = extract_function_call("@f(42, -1.5, user.name, missing, count, raw text)", &env())
            .unwrap()
            .unwrap();
        assert_eq!(
            call.args,
            vec![json!(42), json!(-1.5), json!("Ada"), json!(""), json!(0), json!("raw text")]
        );
    }

    #[test]
    fn test_nested_call_is_evaluated() {
        assert_eq!(invoke_function_call("@pow(sum(2, 3), 2)", &env()), Ok(json!(25)));
    }

    #[test]
    fn test_unknown_function() {
        let err = invoke_function_call("@nope(1)", &env()).unwrap_err();
        assert_eq!(err.to_string(), "`nope` is not a function");
    }

    #[test]
    fn test_not_a_call() {
        assert_eq!(extract_function_call("@(user)", &env()), Ok(None));
    }
}
