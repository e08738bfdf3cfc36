//! Built-in function modules, registered with `use <module>`.

pub mod date;
pub mod math;
pub mod number;
pub mod string;

use serde_json::Value;

use crate::coerce::NULL;
use crate::evaluator::EvalError;

/// A native function.
pub type Builtin = fn(&[Value]) -> Result<Value, EvalError>;

/// A named set of native functions.
pub struct Module {
    pub name: &'static str,
    pub functions: &'static [(&'static str, Builtin)],
}

impl Module {
    pub fn lookup(&self, name: &str) -> Option<Builtin> {
        self.functions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }
}

const MODULES: [&Module; 4] = [&string::MODULE, &number::MODULE, &math::MODULE, &date::MODULE];

/// The module registered under `name`.
pub fn module(name: &str) -> Option<&'static Module> {
    MODULES.into_iter().find(|module| module.name == name)
}

/// Positional argument, `null` when absent.
pub(crate) fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_lookup() {
        assert!(module("string").is_some());
        assert!(module("date").is_some());
        assert!(module("regex").is_none());
        assert!(module("math").and_then(|m| m.lookup("pow")).is_some());
        assert!(module("math").and_then(|m| m.lookup("upper")).is_none());
    }
}
