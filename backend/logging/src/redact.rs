//! Log redaction: scrubs API keys, bearer tokens and secret-looking JSON
//! fields before they reach a log sink.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[A-Za-z0-9_\-]{20,})|(gh[pousr]_[A-Za-z0-9]{20,})|(Bearer\s+[A-Za-z0-9\-._~+/]+=*)")
        .expect("valid token pattern")
});

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:api[_-]?key|token|secret|password)\s*[=:]\s*)\S+")
        .expect("valid assignment pattern")
});

const SECRET_KEYS: &[&str] = &["api_key", "apikey", "token", "secret", "password", "authorization"];

pub const REDACTED: &str = "[REDACTED]";

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    ASSIGNMENT_RE
        .replace_all(&redacted, format!("${{1}}{REDACTED}"))
        .into_owned()
}

/// Redact a JSON tree: secret-named fields are masked, other strings are
/// scrubbed with [`redact_sensitive_data`].
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_sensitive_data(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = if is_secret_key(k) && !v.is_null() {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(v)
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEYS.iter().any(|s| key.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redaction() {
        let raw = "curl -H 'Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9' with sk-abcdefghijklmnopqrstuvwxyz";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
        assert!(!clean.contains("sk-abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn test_assignment_keeps_key_name() {
        let clean = redact_sensitive_data("export API_KEY=hunter2 && run");
        assert_eq!(clean, "export API_KEY=[REDACTED] && run");
    }

    #[test]
    fn test_value_masks_secret_fields() {
        let v = json!({"path": "a.rs", "auth": {"apiKey": "abc", "user": "dev"}, "cmd": ["password: x1"]});
        let out = redact_value(&v);
        assert_eq!(out["path"], "a.rs");
        assert_eq!(out["auth"]["apiKey"], REDACTED);
        assert_eq!(out["auth"]["user"], "dev");
        assert_eq!(out["cmd"][0], "password: [REDACTED]");
    }
}
