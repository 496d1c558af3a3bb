// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `%{name}` variable substitution over a workflow step's JSON `args`.
//! Substitution walks a JSON tree rather than a flat string, since
//! workflow `args` are JSON values.
//!
//! Substituted values are not URL-encoded by default. This implementation
//! encodes only when the substitution target is a URL-shaped argument key
//! (`url`, `href`) — elsewhere substitution is verbatim text replacement.
use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value;

use crate::error::WorkflowError;

/// Argument keys treated as URL-shaped for the purpose of the
/// percent-encoding decision above.
const URL_SHAPED_KEYS: &[&str] = &["url", "href"];

/// Substitutes every `%{name}` placeholder found in string leaves of
/// `args`, recursively, using `vars`. A value that is *exactly* one
/// placeholder (`"%{name}"`, nothing else in the string) is replaced by
/// the captured variable's own JSON value (so an array or object capture
/// can be substituted whole, e.g. `each: "%{urls}"`); a placeholder
/// embedded in a larger string is replaced by the variable's text
/// rendering. Unknown variables are an error — there is no "leave
/// as-is" fallback for this wire-facing substitution.
pub fn resolve_vars(args: &Value, vars: &HashMap<String, Value>) -> Result<Value, WorkflowError> {
    resolve_vars_keyed(args, vars, None)
}

fn resolve_vars_keyed(
    value: &Value,
    vars: &HashMap<String, Value>,
    key: Option<&str>,
) -> Result<Value, WorkflowError> {
    match value {
        Value::String(s) => resolve_string(s, vars, key),
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|v| resolve_vars_keyed(v, vars, None))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_vars_keyed(v, vars, Some(k))?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, vars: &HashMap<String, Value>, key: Option<&str>) -> Result<Value, WorkflowError> {
    if let Some(name) = whole_placeholder(s) {
        let v = vars.get(name).ok_or_else(|| WorkflowError::UnknownVariable(name.to_string()))?;
        return Ok(v.clone());
    }

    if !s.contains("%{") {
        return Ok(Value::String(s.to_string()));
    }

    let url_shaped = key.map(|k| URL_SHAPED_KEYS.contains(&k)).unwrap_or(false);
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| WorkflowError::UnknownVariable(name.to_string()))?;
        let rendered = render_scalar(value);
        if url_shaped {
            out.push_str(&utf8_percent_encode(&rendered, NON_ALPHANUMERIC).to_string());
        } else {
            out.push_str(&rendered);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

/// Returns `Some(name)` when `s` is exactly one placeholder with nothing
/// else around it.
fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("%{")?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains("%{") || inner.contains('}') {
        return None;
    }
    Some(inner)
}

fn render_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parses a `KEY=VALUE` CLI flag into a seed variable, grounded on
/// `sven-ci::template::parse_var`. The value is always stored as a JSON
/// string — seed variables from the command line have no richer type to
/// infer.
pub fn parse_var(spec: &str) -> Option<(String, Value)> {
    let (k, v) = spec.split_once('=')?;
    if k.trim().is_empty() {
        return None;
    }
    Some((k.trim().to_string(), Value::String(v.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn simple_substitution_in_string_leaf() {
        let args = json!({"expr": "return %{title}"});
        let out = resolve_vars(&args, &vars(&[("title", json!("hello"))])).unwrap();
        assert_eq!(out, json!({"expr": "return hello"}));
    }

    #[test]
    fn whole_placeholder_substitutes_raw_value() {
        let args = json!("%{urls}");
        let out = resolve_vars(&args, &vars(&[("urls", json!(["a", "b", "c"]))])).unwrap();
        assert_eq!(out, json!(["a", "b", "c"]));
    }

    #[test]
    fn url_key_percent_encodes_embedded_value() {
        let args = json!({"url": "https://example.com/search?q=%{t}"});
        let out = resolve_vars(&args, &vars(&[("t", json!("hello world"))])).unwrap();
        assert_eq!(out["url"], json!("https://example.com/search?q=hello%20world"));
    }

    #[test]
    fn non_url_key_does_not_encode() {
        let args = json!({"expr": "%{t}"});
        let out = resolve_vars(&args, &vars(&[("t", json!("hello world"))])).unwrap();
        assert_eq!(out["expr"], json!("hello world"));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let args = json!({"url": "%{missing}"});
        let err = resolve_vars(&args, &HashMap::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownVariable(_)));
    }

    #[test]
    fn nested_objects_and_arrays_are_walked() {
        let args = json!({"a": {"b": ["%{x}", "plain"]}});
        let out = resolve_vars(&args, &vars(&[("x", json!("v"))])).unwrap();
        assert_eq!(out, json!({"a": {"b": ["v", "plain"]}}));
    }

    #[test]
    fn no_placeholders_returns_unchanged() {
        let args = json!({"a": 1, "b": "text"});
        let out = resolve_vars(&args, &HashMap::new()).unwrap();
        assert_eq!(out, args);
    }

    #[test]
    fn parse_var_splits_on_first_equals() {
        let (k, v) = parse_var("url=https://example.com?a=b").unwrap();
        assert_eq!(k, "url");
        assert_eq!(v, json!("https://example.com?a=b"));
    }

    #[test]
    fn parse_var_rejects_missing_equals() {
        assert!(parse_var("noequalssign").is_none());
    }
}
