use std::f64::consts;

use serde_json::Value;

use super::{arg, Module};
use crate::coerce::{number_value, to_number};
use crate::evaluator::EvalError;

pub const MODULE: Module = Module {
    name: "math",
    functions: &[
        ("PI", |_| Ok(number_value(consts::PI))),
        ("E", |_| Ok(number_value(consts::E))),
        ("SQRT2", |_| Ok(number_value(consts::SQRT_2))),
        ("SQRT12", |_| Ok(number_value(consts::FRAC_1_SQRT_2))),
        ("LN2", |_| Ok(number_value(consts::LN_2))),
        ("LN10", |_| Ok(number_value(consts::LN_10))),
        ("LOG2E", |_| Ok(number_value(consts::LOG2_E))),
        ("LOG10E", |_| Ok(number_value(consts::LOG10_E))),
        ("round", |args| unary(args, round)),
        ("ceil", |args| unary(args, f64::ceil)),
        ("floor", |args| unary(args, f64::floor)),
        ("trunc", |args| unary(args, f64::trunc)),
        ("sign", |args| unary(args, sign)),
        ("pow", |args| {
            Ok(number_value(pow(to_number(arg(args, 0)), to_number(arg(args, 1)))))
        }),
        ("sqrt", |args| unary(args, f64::sqrt)),
        ("abs", |args| unary(args, f64::abs)),
        ("sin", |args| unary(args, f64::sin)),
        ("cos", |args| unary(args, f64::cos)),
        ("tan", |args| unary(args, f64::tan)),
        ("random", |_| Ok(number_value(rand::random::<f64>()))),
        ("log", |args| unary(args, f64::ln)),
        ("log2", |args| unary(args, f64::log2)),
        ("log10", |args| unary(args, f64::log10)),
    ],
};

/// Look a math function or constant up by name.
pub fn lookup(name: &str) -> Option<super::Builtin> {
    MODULE.lookup(name)
}

fn unary(args: &[Value], f: fn(f64) -> f64) -> Result<Value, EvalError> {
    Ok(number_value(f(to_number(arg(args, 0)))))
}

/// Rounds half toward positive infinity.
fn round(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let floor = x.floor();
    if x - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

fn sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        x
    } else {
        x.signum()
    }
}

fn pow(base: f64, exponent: f64) -> f64 {
    // 1 ** NaN and (+/-1) ** Infinity are NaN in JavaScript.
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}
