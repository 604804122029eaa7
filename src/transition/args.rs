//! Transition argument lists.
//!
//! Arguments arrive in three forms:
//! - static: a JSON array stored in the template
//! - expression: JSON source with `_0`, `_1`, ... placeholders standing for
//!   the values of the expression's references
//! - dynamic: a fragment whose text, wrapped in brackets, is a JSON array

use crate::error::{Result, ViewError};
use crate::types::Value;

/// Evaluate expression source, substituting `_N` with the `N`th value.
pub fn evaluate_expression(source: &str, values: &[Value]) -> Result<Vec<Value>> {
    let substituted = substitute(source, values);
    let parsed: Value = serde_json::from_str(&substituted)
        .map_err(|e| ViewError::MalformedTemplate(format!("transition arguments '{source}': {e}")))?;
    Ok(into_list(parsed))
}

/// Parse the text of a dynamic argument fragment.
pub fn parse_args_list(text: &str) -> Result<Vec<Value>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<Value>>(&format!("[{text}]"))
        .map_err(|e| ViewError::MalformedTemplate(format!("transition arguments '{text}': {e}")))
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn substitute(source: &str, values: &[Value]) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        let starts_token = c == '_'
            && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())
            && (i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_'));
        if starts_token {
            let mut end = i + 1;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
            let index: usize = chars[i + 1..end].iter().collect::<String>().parse().unwrap_or(usize::MAX);
            let value = values.get(index).cloned().unwrap_or(Value::Null);
            out.push_str(&value.to_string());
            i = end;
            continue;
        }

        if c == '"' {
            in_string = true;
        }
        out.push(c);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expression_substitution() {
        let args = evaluate_expression("[{\"duration\": _0}, _1]", &[json!(250), json!("x")]).unwrap();
        assert_eq!(args, vec![json!({ "duration": 250 }), json!("x")]);
    }

    #[test]
    fn test_placeholders_inside_strings_are_kept() {
        let args = evaluate_expression("[\"_0\", _0]", &[json!(1)]).unwrap();
        assert_eq!(args, vec![json!("_0"), json!(1)]);
    }

    #[test]
    fn test_missing_values_are_null() {
        assert_eq!(evaluate_expression("_3", &[]).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn test_args_list() {
        assert_eq!(
            parse_args_list("{\"duration\": 100}, \"fast\"").unwrap(),
            vec![json!({ "duration": 100 }), json!("fast")]
        );
        assert!(parse_args_list("").unwrap().is_empty());
        assert!(parse_args_list("{oops").is_err());
    }
}
