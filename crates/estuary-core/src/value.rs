//! Layer 2: Scalar values
//!
//! The primitive leaves of the document tree, and their canonical JSON text.

use serde::{Deserialize, Serialize};

/// A JSON scalar stored at a document leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
}

impl Value {
    /// Canonical JSON text of this scalar.
    ///
    /// Integers never grow a trailing `.0`; strings are JSON-escaped.
    pub fn marshal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Double(n) => {
                serde_json::to_string(n).unwrap_or_else(|_| "null".to_string())
            }
            Value::Str(s) => serde_json::to_string(s).unwrap_or_default(),
        }
    }

    /// Byte length of the canonical text; the `data` component of doc size.
    pub fn data_size(&self) -> usize {
        self.marshal().len()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
