use serde_json::Value;

use super::{arg, Module};
use crate::coerce::{format_number, number_value, parse_float, parse_int, to_number};
use crate::evaluator::EvalError;

pub const MODULE: Module = Module {
    name: "number",
    functions: &[
        ("toFixed", to_fixed),
        ("number", number),
        ("parseInt", |args| Ok(number_value(parse_int(arg(args, 0))))),
        ("parseFloat", |args| Ok(number_value(parse_float(arg(args, 0))))),
        ("isInteger", is_integer),
        ("isSafeInteger", is_safe_integer),
    ],
};

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// `toFixed(value, digits)`: `value` is read with `parseFloat`; the result is
/// a string rounded half up to `digits` decimals.
pub fn to_fixed(args: &[Value]) -> Result<Value, EvalError> {
    let x = parse_float(arg(args, 0));
    let digits = match to_number(arg(args, 1)) {
        d if d.is_nan() => 0.0,
        d => d.trunc(),
    };
    if !(0.0..=100.0).contains(&digits) {
        return Err(EvalError::Type(
            "toFixed() digits argument must be between 0 and 100".into(),
        ));
    }
    if !x.is_finite() || x.abs() >= 1e21 {
        return Ok(Value::String(format_number(x)));
    }

    let digits = digits as usize;
    let factor = 10f64.powi(digits as i32);
    let scaled = x.abs() * factor;
    let magnitude = if scaled.is_finite() {
        scaled.round() / factor
    } else {
        x.abs()
    };
    let sign = if x < 0.0 { "-" } else { "" };
    Ok(Value::String(format!("{sign}{magnitude:.digits$}")))
}

fn number(args: &[Value]) -> Result<Value, EvalError> {
    Ok(number_value(args.first().map_or(0.0, to_number)))
}

fn is_integer(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(parse_int(arg(args, 0)).is_finite()))
}

fn is_safe_integer(args: &[Value]) -> Result<Value, EvalError> {
    let n = parse_int(arg(args, 0));
    Ok(Value::Bool(n.is_finite() && n.abs() <= MAX_SAFE_INTEGER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Value {
        MODULE.lookup(name).unwrap()(args).unwrap()
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(call("toFixed", &[json!("2.54"), json!(0)]), json!("3"));
        assert_eq!(call("toFixed", &[json!(2.5), json!(0)]), json!("3"));
        assert_eq!(call("toFixed", &[json!(1.23456), json!(2)]), json!("1.23"));
        assert_eq!(call("toFixed", &[json!(-1.5), json!(1)]), json!("-1.5"));
        assert_eq!(call("toFixed", &[json!("abc"), json!(2)]), json!("NaN"));
        assert_eq!(call("toFixed", &[json!(7)]), json!("7"));
    }

    #[test]
    fn test_to_fixed_range() {
        let err = to_fixed(&[json!(1), json!(101)]).unwrap_err();
        assert!(err.to_string().contains("between 0 and 100"));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("number", &[json!("42")]), json!(42));
        assert_eq!(call("number", &[json!("4x")]), json!("NaN"));
        assert_eq!(call("parseInt", &[json!("42.9px")]), json!(42));
        assert_eq!(call("parseFloat", &[json!("42.5px")]), json!(42.5));
    }

    #[test]
    fn test_integer_checks() {
        assert_eq!(call("isInteger", &[json!("12")]), json!(true));
        assert_eq!(call("isInteger", &[json!("x")]), json!(false));
        assert_eq!(call("isSafeInteger", &[json!("9007199254740993")]), json!(false));
    }
}
