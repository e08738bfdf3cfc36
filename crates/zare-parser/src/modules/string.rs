//! String functions, shared by the `string` module and by string methods in
//! expressions. Indices count characters.

use serde_json::Value;

use super::{arg, Module};
use crate::coerce::{number_value, to_display, to_number};
use crate::evaluator::{relative_index, slice_bounds, EvalError};

pub const MODULE: Module = Module {
    name: "string",
    functions: &[
        ("length", |args| Ok(Value::from(text(args).chars().count()))),
        ("upper", |args| Ok(Value::String(text(args).to_uppercase()))),
        ("lower", |args| Ok(Value::String(text(args).to_lowercase()))),
        ("at", |args| Ok(char_at(&text(args), arg(args, 1)))),
        ("codeAt", |args| Ok(char_code_at(&text(args), arg(args, 1)))),
        ("slice", |args| Ok(slice(&text(args), &args[args.len().min(1)..]))),
        ("subString", |args| {
            Ok(substring(&text(args), arg(args, 1), arg(args, 2)))
        }),
        ("concat", |args| {
            Ok(Value::String(args.iter().map(to_display).collect()))
        }),
        ("trim", |args| Ok(Value::String(text(args).trim().to_string()))),
        ("trimStart", |args| {
            Ok(Value::String(text(args).trim_start().to_string()))
        }),
        ("trimEnd", |args| Ok(Value::String(text(args).trim_end().to_string()))),
        ("repeat", |args| repeat(&text(args), arg(args, 1))),
        ("replace", |args| {
            Ok(replace(&text(args), arg(args, 1), arg(args, 2), false))
        }),
        ("replaceAll", |args| {
            Ok(replace(&text(args), arg(args, 1), arg(args, 2), true))
        }),
        ("split", |args| Ok(split(&text(args), arg(args, 1)))),
    ],
};

/// The first argument as a string; null reads as empty.
fn text(args: &[Value]) -> String {
    match arg(args, 0) {
        Value::Null => String::new(),
        other => to_display(other),
    }
}

/// A string method called from an expression, or `None` when `name` is not
/// a supported method.
pub(crate) fn method(s: &str, name: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
    let first = arg(args, 0);
    let needle = || to_display(first);
    let value = match name {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "trimStart" => Value::String(s.trim_start().to_string()),
        "trimEnd" => Value::String(s.trim_end().to_string()),
        "includes" => Value::Bool(s.contains(needle().as_str())),
        "startsWith" => Value::Bool(s.starts_with(needle().as_str())),
        "endsWith" => Value::Bool(s.ends_with(needle().as_str())),
        "indexOf" => Value::from(
            s.find(needle().as_str())
                .map_or(-1, |byte| s[..byte].chars().count() as i64),
        ),
        "slice" => slice(s, args),
        "substring" => substring(s, first, arg(args, 1)),
        "charAt" => char_at(s, first),
        "charCodeAt" => char_code_at(s, first),
        "at" => {
            let chars: Vec<char> = s.chars().collect();
            relative_index(to_number(first), chars.len())
                .map_or(Value::Null, |i| Value::String(chars[i].to_string()))
        }
        "repeat" => return Some(repeat(s, first)),
        "replace" => replace(s, first, arg(args, 1), false),
        "replaceAll" => replace(s, first, arg(args, 1), true),
        "split" => split(s, first),
        "concat" => Value::String(
            std::iter::once(s.to_string())
                .chain(args.iter().map(to_display))
                .collect(),
        ),
        "toString" => Value::String(s.to_string()),
        _ => return None,
    };
    Some(Ok(value))
}

fn index(value: &Value) -> f64 {
    match to_number(value) {
        n if n.is_nan() => 0.0,
        n => n.trunc(),
    }
}

fn char_at(s: &str, position: &Value) -> Value {
    let position = index(position);
    let found = (position >= 0.0)
        .then(|| s.chars().nth(position as usize))
        .flatten();
    Value::String(found.map(String::from).unwrap_or_default())
}

fn char_code_at(s: &str, position: &Value) -> Value {
    let position = index(position);
    let found = (position >= 0.0)
        .then(|| s.chars().nth(position as usize))
        .flatten();
    found.map_or_else(|| number_value(f64::NAN), |c| Value::from(u32::from(c)))
}

fn slice(s: &str, bounds: &[Value]) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let (start, end) = slice_bounds(bounds, chars.len());
    Value::String(chars[start..end.max(start)].iter().collect())
}

fn substring(s: &str, start: &Value, end: &Value) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let clamp = |value: &Value, default: usize| match value {
        Value::Null => default,
        other => index(other).clamp(0.0, chars.len() as f64) as usize,
    };
    let (a, b) = (clamp(start, 0), clamp(end, chars.len()));
    let (from, to) = if a <= b { (a, b) } else { (b, a) };
    Value::String(chars[from..to].iter().collect())
}

/// Longest string `repeat` will build, in bytes.
const MAX_STRING_LENGTH: usize = 1 << 29;

fn repeat(s: &str, count: &Value) -> Result<Value, EvalError> {
    let count = index(count);
    if count < 0.0 || count.is_infinite() {
        return Err(EvalError::Type(format!(
            "Invalid count value: {}",
            crate::coerce::format_number(count)
        )));
    }
    if s.is_empty() {
        return Ok(Value::String(String::new()));
    }
    if s.len() as f64 * count > MAX_STRING_LENGTH as f64 {
        return Err(EvalError::Type("Invalid string length".to_string()));
    }
    Ok(Value::String(s.repeat(count as usize)))
}

fn replace(s: &str, pattern: &Value, replacement: &Value, all: bool) -> Value {
    let pattern = to_display(pattern);
    let replacement = to_display(replacement);
    Value::String(if all {
        s.replace(&pattern, &replacement)
    } else {
        s.replacen(&pattern, &replacement, 1)
    })
}

fn split(s: &str, separator: &Value) -> Value {
    let parts: Vec<Value> = match separator {
        Value::Null => vec![Value::String(s.to_string())],
        other => match to_display(other).as_str() {
            "" => s.chars().map(|c| Value::String(c.to_string())).collect(),
            sep => s.split(sep).map(|p| Value::String(p.to_string())).collect(),
        },
    };
    Value::Array(parts)
}
