//! Case-insensitive field diff between a stored example payload and a
//! user-submitted one, plus the corrected document built from both.
//!
//! Only the top-level properties of two JSON objects are compared; nested
//! arrays and objects are treated as opaque values of their kind.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::BridgeError;

/// Kind of a parsed JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Bool,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DifferenceType {
    Missing,
    TypeMismatch,
    Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: DifferenceType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub differences: Vec<Difference>,
    pub example_json: String,
    pub corrected_json: String,
}

impl Reconciliation {
    pub fn count(&self, kind: DifferenceType) -> usize {
        self.differences.iter().filter(|d| d.kind == kind).count()
    }
}

/// Parse `raw` as a JSON object, labelling failures with `context`.
pub fn parse_object(raw: &str, context: &str) -> Result<Map<String, Value>, BridgeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| BridgeError::invalid_json(context, &e))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(BridgeError::InvalidJson {
            context: context.to_string(),
            message: format!("expected an object, found {:?}", JsonKind::of(&other)),
        }),
    }
}

/// Index the properties of `obj` by upper-cased name.
///
/// Two properties that differ only by case cannot be reconciled and are
/// reported as a validation error.
fn fold_keys<'a>(
    obj: &'a Map<String, Value>,
    context: &str,
) -> Result<HashMap<String, (&'a str, &'a Value)>, BridgeError> {
    let mut out = HashMap::with_capacity(obj.len());
    for (key, value) in obj {
        if let Some((prev, _)) = out.insert(key.to_uppercase(), (key.as_str(), value)) {
            return Err(BridgeError::Validation(format!(
                "{context} has properties '{prev}' and '{key}' that differ only by case"
            )));
        }
    }
    Ok(out)
}

/// Compare `user_raw` against `example_raw`.
pub fn reconcile(example_raw: &str, user_raw: &str) -> Result<Reconciliation, BridgeError> {
    let user = parse_object(user_raw, "user JSON")?;
    let example = parse_object(example_raw, "example JSON")?;

    let user_by_key = fold_keys(&user, "user JSON")?;
    let example_by_key = fold_keys(&example, "example JSON")?;

    let mut differences = Vec::new();

    for (name, expected) in &example {
        match user_by_key.get(&name.to_uppercase()) {
            None => differences.push(Difference {
                field: name.clone(),
                kind: DifferenceType::Missing,
                message: format!("Field '{name}' is missing and will be added"),
                expected: Some(expected.clone()),
                actual: None,
            }),
            Some((_, actual)) => {
                let (want, got) = (JsonKind::of(expected), JsonKind::of(actual));
                if !actual.is_null() && want != got {
                    differences.push(Difference {
                        field: name.clone(),
                        kind: DifferenceType::TypeMismatch,
                        message: format!(
                            "Field '{name}' has type {got:?} but {want:?} was expected"
                        ),
                        expected: Some(expected.clone()),
                        actual: Some((*actual).clone()),
                    });
                }
            }
        }
    }

    for (name, actual) in &user {
        if actual.is_null() || example_by_key.contains_key(&name.to_uppercase()) {
            continue;
        }
        differences.push(Difference {
            field: name.clone(),
            kind: DifferenceType::Extra,
            message: format!("Field '{name}' is not present in the example"),
            expected: None,
            actual: Some(actual.clone()),
        });
    }

    let corrected = corrected_document(&example, &user, &user_by_key, &example_by_key);

    Ok(Reconciliation {
        differences,
        example_json: serde_json::to_string_pretty(&Value::Object(example.clone()))?,
        corrected_json: serde_json::to_string_pretty(&Value::Object(corrected))?,
    })
}

/// Example field order and casing, user value preferred; user-only fields are
/// appended. Null values are left out on both sides.
fn corrected_document(
    example: &Map<String, Value>,
    user: &Map<String, Value>,
    user_by_key: &HashMap<String, (&str, &Value)>,
    example_by_key: &HashMap<String, (&str, &Value)>,
) -> Map<String, Value> {
    let mut out = Map::new();

    for (name, expected) in example {
        let chosen = match user_by_key.get(&name.to_uppercase()) {
            Some((_, actual)) if !actual.is_null() => Some(*actual),
            _ if !expected.is_null() => Some(expected),
            _ => None,
        };
        if let Some(value) = chosen {
            out.insert(name.clone(), value.clone());
        }
    }

    for (name, actual) in user {
        if !actual.is_null() && !example_by_key.contains_key(&name.to_uppercase()) {
            out.insert(name.clone(), actual.clone());
        }
    }

    out
}

/// Copy the primary-key fields from `post_data` into the stored example.
///
/// Key names are matched exactly; keys absent from `post_data` keep the
/// example value.
pub fn apply_primary_keys(
    example_raw: &str,
    post_data: &Value,
    primary_keys: &[String],
) -> Result<String, BridgeError> {
    let mut example = parse_object(example_raw, "example JSON")?;
    if let Value::Object(data) = post_data {
        for key in primary_keys {
            if let Some(value) = data.get(key) {
                example.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(serde_json::to_string_pretty(&Value::Object(example))?)
}

/// Pretty-print `raw` when it is JSON, otherwise return it untouched.
pub fn format_json(raw: &str) -> String {
    if raw.trim().is_empty() {
        return "{}".to_string();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Like [`format_json`], but first unwraps a JSON string literal holding
/// escaped JSON (`"{\"A\":1}"`).
pub fn unescape_and_format(raw: &str) -> String {
    if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(raw) {
        return format_json(&inner);
    }
    format_json(raw)
}
