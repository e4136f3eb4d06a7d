//! Dynamically typed parameter and state values
//!
//! Plugin authors write node parameters as JSON, so a value is one of a
//! small closed set of scalars. Coercion helpers follow a
//! "number, else numeric string" fallback chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar value carried by node params, state, and items
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// One working row of a run
pub type Item = BTreeMap<String, Value>;

impl Value {
    /// Returns true for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: numbers pass through, strings are parsed after trimming
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Integer view: parse as integer first, then as float and truncate
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n.trunc() as i64))
            }
            _ => None,
        }
    }

    /// Boolean view with truthy-string tolerance
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::String(s) => parse_truthy(s),
            Value::Null => None,
        }
    }

    /// Stringified form used by templates and string comparisons
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

/// Parse the string spellings accepted for booleans
pub fn parse_truthy(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_integral_numbers() {
        assert_eq!(Value::Number(5.0).to_text(), "5");
        assert_eq!(Value::Number(-1.0).to_text(), "-1");
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::Null.to_text(), "");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::from("10").as_f64(), Some(10.0));
        assert_eq!(Value::from(" 3.7 ").as_i64(), Some(3));
        assert_eq!(Value::from("abc").as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_truthy_strings() {
        assert_eq!(Value::from("YES").as_bool(), Some(true));
        assert_eq!(Value::from("0").as_bool(), Some(false));
        assert_eq!(Value::from("maybe").as_bool(), None);
    }

    #[test]
    fn test_json_mapping() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 4, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Number(4.0),
                Value::String("x".into())
            ]
        );
        assert!(serde_json::from_str::<Value>("[1]").is_err());
    }
}
