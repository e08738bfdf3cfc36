use serde_json::Value;
use zare_parser::Params;

/// Key under which the unescaped parameters stay reachable.
pub const RAW_PARAMETERS_KEY: &str = "_";

/// Escape HTML special characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Copy of `parameters` with every string escaped, through nested objects
/// and arrays, plus the original bag under `_`.
pub fn sanitize_parameters(parameters: &Params) -> Params {
    let mut sanitized: Params = parameters
        .iter()
        .map(|(key, value)| (key.clone(), escape_value(value)))
        .collect();
    sanitized.insert(
        RAW_PARAMETERS_KEY.to_string(),
        Value::Object(parameters.clone()),
    );
    sanitized
}

fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_html(s)),
        Value::Array(items) => Value::Array(items.iter().map(escape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), escape_value(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}
