use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell. Serialized as a bare JSON number, string, or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Total order used by case sorting: missing < numbers < strings.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Missing, Value::Missing) => Ordering::Equal,
            (Value::Missing, _) => Ordering::Less,
            (_, Value::Missing) => Ordering::Greater,
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Number(_), Value::Text(_)) => Ordering::Less,
            (Value::Text(_), Value::Number(_)) => Ordering::Greater,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::Missing => f.write_str("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_missing_then_numbers_then_text() {
        let mut values = vec![
            Value::from("b"),
            Value::from(2.0),
            Value::Missing,
            Value::from("a"),
            Value::from(-1.0),
        ];
        values.sort_by(Value::total_cmp);

        assert_eq!(
            values,
            vec![
                Value::Missing,
                Value::from(-1.0),
                Value::from(2.0),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn deserializes_bare_json_cells() {
        let parsed: Vec<Value> = serde_json::from_str(r#"[1.5, "x", null, 3]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Value::Number(1.5),
                Value::Text("x".into()),
                Value::Missing,
                Value::Number(3.0),
            ]
        );
        assert_eq!(serde_json::to_string(&Value::Missing).unwrap(), "null");
    }
}
