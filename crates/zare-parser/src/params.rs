//! Parameter bags, path lookup and `@( … )` substitution.

use serde_json::{Map, Value};

use crate::coerce::{to_display, truthy};

/// The data a template is rendered with.
pub type Params = Map<String, Value>;

/// Stands in for the `@` of any `@(` that arrives through parameter data, so
/// an inserted value is never substituted a second time.
const SHIELDED_AT: char = '\u{E000}';

/// Neutralize `@(` sequences in text that came from parameter data.
pub fn shield(value: &str) -> String {
    value.replace("@(", "\u{E000}(")
}

/// Restore shielded `@` characters. Run once on the finished document.
pub fn unshield(html: &str) -> String {
    html.replace(SHIELDED_AT, "@")
}

/// Split `a.b[0]["c"]['d']` into `["a", "b", "0", "c", "d"]`.
fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => segments.push(std::mem::take(&mut current)),
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut key = String::new();
                for k in chars.by_ref() {
                    if Some(k) == quote || (quote.is_none() && k == ']') {
                        break;
                    }
                    key.push(k);
                }
                if quote.is_some() && chars.peek() == Some(&']') {
                    chars.next();
                }
                segments.push(key);
                if chars.peek() == Some(&'.') {
                    chars.next();
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || segments.is_empty() {
        segments.push(current);
    }
    segments
}

fn step<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn finish(value: &Value, last: &str) -> Option<Value> {
    match (value, last) {
        (Value::Array(items), "length") => Some(Value::from(items.len())),
        _ => step(value, last).cloned(),
    }
}

/// Look up a dotted/bracketed path inside `value`. Traverses objects and
/// arrays only; any miss yields `None`.
pub fn get_value(value: &Value, path: &str) -> Option<Value> {
    let segments = path_segments(path);
    let (last, init) = segments.split_last()?;
    let mut current = value;
    for key in init {
        current = step(current, key)?;
    }
    finish(current, last)
}

/// `get_value` against a parameter bag.
pub fn lookup(params: &Params, path: &str) -> Option<Value> {
    let segments = path_segments(path);
    let (first, rest) = segments.split_first()?;
    let mut current = params.get(first.as_str())?;
    let Some((last, middle)) = rest.split_last() else {
        return Some(current.clone());
    };
    for key in middle {
        current = step(current, key)?;
    }
    finish(current, last)
}

/// How a looked-up value is written into HTML. Missing values and `null`
/// render as nothing; objects render as JSON.
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Object(_)) => value
            .and_then(|v| serde_json::to_string(v).ok())
            .unwrap_or_default(),
        Some(other) => to_display(other),
    }
}

/// Resolve the inside of one `@( … )`, including the `a || b` fallback form
/// whose right side may be a quoted literal.
pub fn resolve_expression(expression: &str, params: &Params) -> String {
    let expression = expression.trim();
    if let Some((left, right)) = expression.split_once("||") {
        if let Some(value) = lookup(params, left.trim()).filter(truthy) {
            return stringify(Some(&value));
        }
        let right = right.trim();
        if let Some(literal) = unquote(right) {
            return literal.to_string();
        }
        return stringify(lookup(params, right).as_ref());
    }
    stringify(lookup(params, expression).as_ref())
}

/// Strip matching single or double quotes.
pub fn unquote(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if !matches!(first, '"' | '\'' | '`') || text.len() < 2 || !text.ends_with(first) {
        return None;
    }
    Some(&text[1..text.len() - 1])
}

/// Replace every single-line `@( … )` in `html` with its value from `params`.
/// The contents of `<style>` and `<script>` elements are left untouched, and
/// inserted values are shielded from later passes.
pub fn substitute_parameters(html: &str, params: &Params) -> String {
    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'@' if bytes.get(i + 1) == Some(&b'(') => {
                let inner_start = i + 2;
                let end = html[inner_start..]
                    .find(['\n', ')'])
                    .map(|offset| inner_start + offset);
                match end {
                    Some(close) if bytes[close] == b')' => {
                        out.push_str(&html[copied..i]);
                        out.push_str(&shield(&resolve_expression(
                            &html[inner_start..close],
                            params,
                        )));
                        i = close + 1;
                        copied = i;
                    }
                    _ => i += 1,
                }
            }
            b'<' => match raw_element_end(html, i) {
                Some(end) => i = end,
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    out.push_str(&html[copied..]);
    out
}

/// If a `<style>`/`<script>` element opens at `start`, the byte offset just
/// past its closing tag (or the end of input when it is never closed).
fn raw_element_end(html: &str, start: usize) -> Option<usize> {
    let rest = &html[start + 1..];
    let name = ["style", "script"].into_iter().find(|name| {
        rest.get(..name.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(name))
            && rest[name.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
    })?;

    let closing = format!("</{name}");
    let lower = html[start..].to_ascii_lowercase();
    let Some(close) = lower.find(&closing) else {
        return Some(html.len());
    };
    let after = start + close;
    Some(
        html[after..]
            .find('>')
            .map_or(html.len(), |offset| after + offset + 1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    // =========================================================================
    // Path lookup
    // =========================================================================

    #[test]
    fn test_get_value_dotted() {
        let data = json!({ "user": { "name": "John" } });
        assert_eq!(get_value(&data, "user.name"), Some(json!("John")));
    }

    #[test]
    fn test_get_value_brackets() {
        let data = json!({ "users": [{ "name": "Ada" }, { "name": "Grace" }] });
        assert_eq!(get_value(&data, "users[1].name"), Some(json!("Grace")));
        assert_eq!(get_value(&data, "users[\"0\"]['name']"), Some(json!("Ada")));
    }

    #[test]
    fn test_get_value_missing() {
        let data = json!({ "user": { "name": "John" } });
        assert_eq!(get_value(&data, "user.age"), None);
        assert_eq!(get_value(&data, "user.name.first"), None);
        assert_eq!(get_value(&data, "nothing.at.all"), None);
    }

    #[test]
    fn test_array_length() {
        let data = json!({ "items": [1, 2, 3] });
        assert_eq!(get_value(&data, "items.length"), Some(json!(3)));
    }

    #[test]
    fn test_lookup_in_params() {
        let p = params(json!({ "a": { "b": [10, 20] } }));
        assert_eq!(lookup(&p, "a.b[1]"), Some(json!(20)));
        assert_eq!(lookup(&p, " a "), Some(json!({ "b": [10, 20] })));
        assert_eq!(lookup(&p, "z"), None);
    }

    // =========================================================================
    // Substitution
    // =========================================================================

    #[test]
    fn test_substitute_nested_path() {
        let p = params(json!({ "user": { "name": "John" } }));
        assert_eq!(
            substitute_parameters("Hello @(user.name)!", &p),
            "Hello John!"
        );
    }

    #[test]
    fn test_substitute_without_parameters() {
        assert_eq!(
            substitute_parameters("Hello @(user.name)!", &Params::new()),
            "Hello !"
        );
    }

    #[test]
    fn test_substitute_numbers_and_arrays() {
        let p = params(json!({ "n": 3, "tags": ["a", "b"], "obj": { "k": 1 } }));
        assert_eq!(
            substitute_parameters("@(n) @(tags) @(obj)", &p),
            "3 a,b {\"k\":1}"
        );
    }

    #[test]
    fn test_fallback_uses_second_operand() {
        let p = params(json!({ "nick": "", "name": "Ada" }));
        assert_eq!(substitute_parameters("@(nick || name)", &p), "Ada");
        assert_eq!(substitute_parameters("@(missing || \"Guest\")", &p), "Guest");
        assert_eq!(substitute_parameters("@(name || \"Guest\")", &p), "Ada");
    }

    #[test]
    fn test_multiline_parameter_is_left_alone() {
        let p = params(json!({ "a": 1 }));
        assert_eq!(substitute_parameters("@(a\n)", &p), "@(a\n)");
        assert_eq!(substitute_parameters("@ (a) @(a", &p), "@ (a) @(a");
    }

    #[test]
    fn test_raw_elements_are_skipped() {
        let p = params(json!({ "a": 1 }));
        assert_eq!(
            substitute_parameters("<style>.x::after{content:\"@(a)\"}</style>@(a)", &p),
            "<style>.x::after{content:\"@(a)\"}</style>1"
        );
        assert_eq!(
            substitute_parameters("<SCRIPT type=\"x\">@(a)</SCRIPT><p>@(a)</p>", &p),
            "<SCRIPT type=\"x\">@(a)</SCRIPT><p>1</p>"
        );
        assert_eq!(
            substitute_parameters("<strong>@(a)</strong>", &p),
            "<strong>1</strong>"
        );
    }

    #[test]
    fn test_inserted_values_are_not_substituted_again() {
        let p = params(json!({ "bio": "@(secret)", "secret": "leaked" }));
        let once = substitute_parameters("<p>@(bio)</p>", &p);
        let twice = substitute_parameters(&once, &p);
        assert_eq!(twice, once);
        assert_eq!(unshield(&twice), "<p>@(secret)</p>");
    }

    #[test]
    fn test_unshield_leaves_plain_text() {
        assert_eq!(unshield("<p>a @ b</p>"), "<p>a @ b</p>");
        assert_eq!(shield("mail@(home)"), "mail\u{E000}(home)");
    }

    #[test]
    fn test_non_ascii_text_is_preserved() {
        let p = params(json!({ "name": "Zoë" }));
        assert_eq!(substitute_parameters("¡Hola @(name)!", &p), "¡Hola Zoë!");
    }
}
