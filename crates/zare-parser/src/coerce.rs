//! JavaScript-compatible conversions over `serde_json::Value`.
//!
//! JSON has no NaN or infinities; non-finite results are carried as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`, which convert back to the
//! same numbers.

use std::cmp::Ordering;

use serde_json::Value;

/// Shared `null` for argument defaults.
pub(crate) static NULL: Value = Value::Null;

/// JavaScript truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty() && s != "NaN",
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `Number(value)`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => string_to_number(s),
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [only] => to_number(only),
            _ => f64::NAN,
        },
        Value::Object(_) => f64::NAN,
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
        {
            trimmed.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// `String(value)`.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_display(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Format a number the way JavaScript prints it: no `.0` for integers.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

/// Wrap a number as a value, keeping integers integral.
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::String(format_number(n));
    }
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0 {
        if n == 0.0 {
            return Value::from(0);
        }
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// `typeof value`.
pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(s) if is_non_finite(s) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn is_non_finite(s: &str) -> bool {
    matches!(s, "NaN" | "Infinity" | "-Infinity")
}

/// `a === b`.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => to_number(a) == to_number(b),
        (Value::String(x), Value::String(y)) => x == y && x != "NaN",
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            std::ptr::eq(a, b)
        }
        _ => a == b,
    }
}

/// `a == b`.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_), Value::String(_)) | (Value::Number(_), Value::Number(_)) => {
            strict_eq(a, b)
        }
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => {
            strict_eq(a, b)
        }
        (Value::Array(_) | Value::Object(_), _) => {
            loose_eq(&Value::String(to_display(a)), b)
        }
        (_, Value::Array(_) | Value::Object(_)) => {
            loose_eq(a, &Value::String(to_display(b)))
        }
        _ => to_number(a) == to_number(b),
    }
}

/// Relational comparison: strings compare lexically, everything else
/// numerically. `None` when either side is NaN.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) if !is_non_finite(x) && !is_non_finite(y) => {
            Some(x.cmp(y))
        }
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// `parseInt(text)`: leading integer prefix after optional whitespace and sign.
pub fn parse_int(value: &Value) -> f64 {
    let text = match value {
        Value::Number(n) => return n.as_f64().map_or(f64::NAN, f64::trunc),
        other => to_display(other),
    };
    let trimmed = text.trim_start();
    let (sign, digits) = split_sign(trimmed);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return f64::NAN;
    }
    digits[..end].parse::<f64>().map_or(f64::NAN, |n| sign * n)
}

/// `parseFloat(text)`: longest decimal prefix.
pub fn parse_float(value: &Value) -> f64 {
    let text = match value {
        Value::Number(n) => return n.as_f64().unwrap_or(f64::NAN),
        other => to_display(other),
    };
    let trimmed = text.trim_start();
    let (sign, rest) = split_sign(trimmed);
    if rest.starts_with("Infinity") {
        return sign * f64::INFINITY;
    }

    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    let bytes = rest.as_bytes();
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    rest[..end].parse::<f64>().map_or(f64::NAN, |n| sign * n)
}

fn split_sign(text: &str) -> (f64, &str) {
    if let Some(rest) = text.strip_prefix('-') {
        (-1.0, rest)
    } else if let Some(rest) = text.strip_prefix('+') {
        (1.0, rest)
    } else {
        (1.0, text)
    }
}
