//! Environment variable substitution for config values.
//!
//! `${VAR_NAME}` in any string leaf is replaced at load time. Only uppercase
//! `[A-Z_][A-Z0-9_]*` names are matched, and `$${VAR}` escapes to a literal
//! `${VAR}`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

/// One pattern for both forms; group 1 is the escaping `$` when present.
static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\$?)\{([A-Z_][A-Z0-9_]*)\}").expect("valid env pattern"));

/// A referenced variable is unset or empty.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    let env: HashMap<String, String> = std::env::vars().collect();
    Ok(substitute(value, &env, "")?)
}

/// Substitute references using an explicit map (tests, embedding).
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    Ok(substitute(value, env, "")?)
}

fn substitute(
    value: &Value,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<Value, MissingEnvVarError> {
    Ok(match value {
        Value::String(s) => Value::String(substitute_str(s, env, path)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| substitute(v, env, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                out.insert(key.clone(), substitute(child, env, &child_path)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

fn substitute_str(
    s: &str,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }
    let mut missing = None;
    let replaced = ENV_REF.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match env.get(name).filter(|v| !v.is_empty()) {
            Some(v) => v.clone(),
            None => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });
    match missing {
        Some(err) => Err(err),
        None => Ok(replaced.into_owned()),
    }
}

/// Whether a string references any variable (escaped ones excluded).
pub fn contains_env_var_reference(s: &str) -> bool {
    ENV_REF.captures_iter(s).any(|c| c[1].is_empty())
}

/// All variable names referenced in a value tree, sorted and deduplicated.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.extend(
                ENV_REF
                    .captures_iter(s)
                    .filter(|c| c[1].is_empty())
                    .map(|c| c[2].to_string()),
            ),
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut vars = Vec::new();
    walk(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_nested_values() {
        let v = json!({"session": {"persistenceDir": "${HOME_DIR}/sessions"}, "list": ["${MODEL}"]});
        let env = env(&[("HOME_DIR", "/home/dev"), ("MODEL", "devstral")]);
        let out = resolve_env_vars_with(&v, &env).unwrap();
        assert_eq!(out["session"]["persistenceDir"], "/home/dev/sessions");
        assert_eq!(out["list"][0], "devstral");
    }

    #[test]
    fn missing_var_reports_path() {
        let v = json!({"model": {"name": "${NOT_SET}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("NOT_SET"));
        assert!(msg.contains("model.name"));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let v = json!({"k": "${EMPTY}"});
        assert!(resolve_env_vars_with(&v, &env(&[("EMPTY", "")])).is_err());
    }

    #[test]
    fn escaped_reference_is_literal() {
        let v = json!({"k": "cost is $${PRICE} per ${UNIT}"});
        let out = resolve_env_vars_with(&v, &env(&[("UNIT", "call")])).unwrap();
        assert_eq!(out["k"], "cost is ${PRICE} per call");
    }

    #[test]
    fn non_strings_pass_through() {
        let v = json!({"n": 3, "b": true, "s": "plain", "lower": "${lower}"});
        let out = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(out, v);
    }

    #[test]
    fn collects_unescaped_names() {
        let v = json!({"a": "${FOO}", "b": {"c": "${BAR} $${SKIP}"}, "d": ["${FOO}"]});
        assert_eq!(collect_referenced_vars(&v), vec!["BAR", "FOO"]);
        assert!(contains_env_var_reference("x ${FOO}"));
        assert!(!contains_env_var_reference("x $${FOO}"));
    }
}
