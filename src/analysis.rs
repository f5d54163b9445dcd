// Response heuristics: echo checks, sensitive-keyword scans, shallow
// schema verdicts and response-shape helpers

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Keywords that should never appear quoted in a response body.
pub const SENSITIVE_KEYWORDS: [&str; 6] = [
    "password",
    "secret",
    "api_key",
    "access_token",
    "hash",
    "private_key",
];

/// Parameter-name fragments that mark a field-selector parameter.
pub const SELECTOR_KEYWORDS: [&str; 5] = ["fields", "select", "required_fields", "include", "exclude"];

/// Case-insensitive search for `needle` among the scalars of a JSON
/// tree, walking through objects and arrays.
pub fn value_echoed(needle: &str, tree: &Value) -> bool {
    match tree {
        Value::String(s) => s.eq_ignore_ascii_case(needle),
        Value::Number(n) => n.to_string() == needle,
        Value::Bool(b) => b.to_string().eq_ignore_ascii_case(needle),
        Value::Null => needle.eq_ignore_ascii_case("null"),
        Value::Array(items) => items.iter().any(|item| value_echoed(needle, item)),
        Value::Object(map) => map.values().any(|value| value_echoed(needle, value)),
    }
}

/// Sensitive keywords appearing quoted anywhere in a raw body.
pub fn sensitive_keywords_in(body: &str) -> Vec<&'static str> {
    let lower = body.to_lowercase();
    SENSITIVE_KEYWORDS
        .iter()
        .filter(|kw| {
            lower.contains(&format!("\"{}\"", kw)) || lower.contains(&format!("'{}'", kw))
        })
        .copied()
        .collect()
}

/// Whether a parameter name looks like a field selector.
pub fn is_field_selector(name: &str) -> bool {
    let lower = name.to_lowercase();
    SELECTOR_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Shallow verdict of a decoded body against a declared schema: the
/// top-level type only, nested shapes are out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaVerdict {
    NotApplicable,
    Pass,
    Fail(String),
}

impl SchemaVerdict {
    pub fn passed_or_na(&self) -> bool {
        !matches!(self, SchemaVerdict::Fail(_))
    }
}

impl fmt::Display for SchemaVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVerdict::NotApplicable => write!(f, "N/A"),
            SchemaVerdict::Pass => write!(f, "PASS"),
            SchemaVerdict::Fail(reason) => write!(f, "FAIL: {}", reason),
        }
    }
}

pub fn shallow_schema_check(body: &Value, schema: &Value) -> SchemaVerdict {
    let expected = match schema.get("type").and_then(Value::as_str) {
        Some(t) => t,
        None => return SchemaVerdict::NotApplicable,
    };
    match expected {
        "array" if !body.is_array() => SchemaVerdict::Fail("Expected array, got object".to_string()),
        "object" if !body.is_object() => {
            SchemaVerdict::Fail("Expected object, got list/primitive".to_string())
        }
        "integer" if !body.is_i64() && !body.is_u64() => {
            SchemaVerdict::Fail("Expected integer".to_string())
        }
        "string" if !body.is_string() => SchemaVerdict::Fail("Expected string".to_string()),
        _ => SchemaVerdict::Pass,
    }
}

/// Top-level keys of a response body: object keys directly, or the
/// first object's keys for a list of objects.
pub fn top_level_keys(body: &Value) -> Vec<String> {
    match body {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// A representative sample of a large response: a list's head, or the
/// first non-empty list inside an object. Returns the sample and the
/// row count it was drawn from.
pub fn sample_rows(body: &Value, limit: usize) -> (Value, usize) {
    match body {
        Value::Array(items) => (
            Value::Array(items.iter().take(limit).cloned().collect()),
            items.len(),
        ),
        Value::Object(map) => {
            for value in map.values() {
                if let Value::Array(items) = value {
                    if !items.is_empty() {
                        return (
                            Value::Array(items.iter().take(limit).cloned().collect()),
                            items.len(),
                        );
                    }
                }
            }
            (body.clone(), 1)
        }
        _ => (body.clone(), 1),
    }
}

/// One finding from the logic and security scan over the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LogicFinding {
    Echoed { param: String, value: String },
    NotEchoed { param: String, value: String },
    SensitiveKeyword { keyword: String },
}

impl LogicFinding {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            LogicFinding::NotEchoed { .. } | LogicFinding::SensitiveKeyword { .. }
        )
    }
}

impl fmt::Display for LogicFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicFinding::Echoed { param, value } => {
                write!(f, "Logic: `{}={}` correctly ECHOED in response.", param, value)
            }
            LogicFinding::NotEchoed { param, value } => write!(
                f,
                "LOGIC WARN: Sent field `{}={}` NOT found in response.",
                param, value
            ),
            LogicFinding::SensitiveKeyword { keyword } => write!(
                f,
                "SECURITY: Response contains sensitive keyword `{}`!",
                keyword
            ),
        }
    }
}

/// Scan a baseline response against the values that were sent with it.
/// Single-character values are too noisy to chase and get skipped. An
/// empty or missing JSON body yields no findings at all.
pub fn run_logic_scan(
    sent: &BTreeMap<String, String>,
    json_body: Option<&Value>,
    raw_body: &str,
) -> Vec<LogicFinding> {
    let mut findings = Vec::new();
    let body = match json_body {
        Some(body) => body,
        None => return findings,
    };
    let empty = body.is_null()
        || matches!(body, Value::Array(items) if items.is_empty())
        || matches!(body, Value::Object(map) if map.is_empty());
    if empty {
        return findings;
    }

    for (param, value) in sent {
        if value.chars().count() <= 1 {
            continue;
        }
        if value_echoed(value, body) {
            findings.push(LogicFinding::Echoed {
                param: param.clone(),
                value: value.clone(),
            });
        } else {
            findings.push(LogicFinding::NotEchoed {
                param: param.clone(),
                value: value.clone(),
            });
        }
    }

    for keyword in sensitive_keywords_in(raw_body) {
        findings.push(LogicFinding::SensitiveKeyword {
            keyword: keyword.to_string(),
        });
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn echo_search_walks_nested_structures() {
        let body = json!({"data": {"items": [{"status": "OPEN"}, {"status": "CLOSED"}]}});
        assert!(value_echoed("open", &body));
        assert!(value_echoed("CLOSED", &body));
        assert!(!value_echoed("PENDING", &body));
    }

    #[test]
    fn echo_search_matches_numbers_and_booleans() {
        let body = json!({"count": 42, "active": true});
        assert!(value_echoed("42", &body));
        assert!(value_echoed("true", &body));
        assert!(!value_echoed("43", &body));
    }

    #[test]
    fn sensitive_scan_needs_quoted_keywords() {
        assert_eq!(
            sensitive_keywords_in(r#"{"password": "x", "name": "y"}"#),
            vec!["password"]
        );
        // unquoted prose mention does not count
        assert!(sensitive_keywords_in("the password policy applies").is_empty());
    }

    #[test]
    fn selector_params_found_by_name_fragment() {
        assert!(is_field_selector("requiredFields"));
        assert!(is_field_selector("select"));
        assert!(is_field_selector("exclude_keys"));
        assert!(!is_field_selector("page"));
    }

    #[test]
    fn schema_check_covers_the_four_shapes() {
        assert_eq!(
            shallow_schema_check(&json!([1]), &json!({"type": "array"})),
            SchemaVerdict::Pass
        );
        assert_eq!(
            shallow_schema_check(&json!({"a": 1}), &json!({"type": "array"})),
            SchemaVerdict::Fail("Expected array, got object".to_string())
        );
        assert_eq!(
            shallow_schema_check(&json!([1]), &json!({"type": "object"})),
            SchemaVerdict::Fail("Expected object, got list/primitive".to_string())
        );
        assert_eq!(
            shallow_schema_check(&json!("x"), &json!({"type": "integer"})),
            SchemaVerdict::Fail("Expected integer".to_string())
        );
        assert_eq!(
            shallow_schema_check(&json!(5), &json!({"nullable": true})),
            SchemaVerdict::NotApplicable
        );
    }

    #[test]
    fn top_level_keys_handles_lists_of_objects() {
        assert_eq!(
            top_level_keys(&json!({"id": 1, "name": "x"})),
            vec!["id", "name"]
        );
        assert_eq!(
            top_level_keys(&json!([{"id": 1, "name": "x"}, {"id": 2}])),
            vec!["id", "name"]
        );
        assert!(top_level_keys(&json!("scalar")).is_empty());
    }

    #[test]
    fn sample_rows_slices_lists_and_embedded_lists() {
        let (sample, total) = sample_rows(&json!([1, 2, 3, 4]), 2);
        assert_eq!(sample, json!([1, 2]));
        assert_eq!(total, 4);

        let (sample, total) = sample_rows(&json!({"meta": {}, "rows": [5, 6, 7]}), 2);
        assert_eq!(sample, json!([5, 6]));
        assert_eq!(total, 3);

        let (sample, total) = sample_rows(&json!({"just": "object"}), 5);
        assert_eq!(sample, json!({"just": "object"}));
        assert_eq!(total, 1);
    }

    #[test]
    fn logic_scan_reports_echo_and_misses() {
        let mut sent = BTreeMap::new();
        sent.insert("status".to_string(), "OPEN".to_string());
        sent.insert("missing".to_string(), "ghost".to_string());
        sent.insert("id".to_string(), "7".to_string()); // single char, skipped

        let body = json!({"results": [{"status": "open"}]});
        let findings = run_logic_scan(&sent, Some(&body), r#"{"results":[]}"#);
        assert_eq!(
            findings,
            vec![
                LogicFinding::NotEchoed {
                    param: "missing".to_string(),
                    value: "ghost".to_string()
                },
                LogicFinding::Echoed {
                    param: "status".to_string(),
                    value: "OPEN".to_string()
                },
            ]
        );
    }

    #[test]
    fn logic_scan_skips_empty_bodies() {
        let mut sent = BTreeMap::new();
        sent.insert("status".to_string(), "OPEN".to_string());
        assert!(run_logic_scan(&sent, Some(&json!([])), "[]").is_empty());
        assert!(run_logic_scan(&sent, None, "").is_empty());
    }

    #[test]
    fn logic_scan_flags_sensitive_keywords() {
        let body = json!({"password": "hunter2"});
        let findings = run_logic_scan(&BTreeMap::new(), Some(&body), r#"{"password": "hunter2"}"#);
        assert_eq!(
            findings,
            vec![LogicFinding::SensitiveKeyword {
                keyword: "password".to_string()
            }]
        );
    }
}
