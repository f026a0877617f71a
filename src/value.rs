//! Typed attribute values
//!
//! Request attributes are modelled as a tagged sum type rather than
//! stringly-typed maps, so the condition evaluator can define its
//! comparison and promotion rules in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed attribute value attached to a principal, resource, or request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// Double-precision float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Point in time (serialized as RFC 3339)
    Timestamp(DateTime<Utc>),
    /// Ordered list of values
    List(Vec<AttrValue>),
    /// String-keyed map of values
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Human-readable type name, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Double(_) => "double",
            AttrValue::String(_) => "string",
            AttrValue::Timestamp(_) => "timestamp",
            AttrValue::List(_) => "list",
            AttrValue::Map(_) => "map",
        }
    }

    /// Convert a `serde_json::Value` into a typed attribute value
    ///
    /// Numbers without a fractional part become `Int`; everything else
    /// maps structurally. `null` has no typed counterpart and is mapped
    /// to an empty string by callers that need one; here it is rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(AttrValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttrValue::Int(i))
                } else {
                    n.as_f64().map(AttrValue::Double)
                }
            }
            serde_json::Value::String(s) => Some(AttrValue::String(s.clone())),
            serde_json::Value::Array(items) => {
                let list: Option<Vec<_>> = items.iter().map(Self::from_json).collect();
                list.map(AttrValue::List)
            }
            serde_json::Value::Object(fields) => {
                let mut map = BTreeMap::new();
                for (k, v) in fields {
                    map.insert(k.clone(), Self::from_json(v)?);
                }
                Some(AttrValue::Map(map))
            }
        }
    }

    /// Returns the string payload if this value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload if this value is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload if this value is an int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Double(d) => write!(f, "{}", d),
            AttrValue::String(s) => write!(f, "{}", s),
            AttrValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttrValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(d: f64) -> Self {
        AttrValue::Double(d)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(t: DateTime<Utc>) -> Self {
        AttrValue::Timestamp(t)
    }
}
