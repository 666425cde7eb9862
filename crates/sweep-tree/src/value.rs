//! Typed leaf values
//!
//! Parameters and result items hold [`Value`]s. Exploration and merge type
//! checks compare [`ValueKind`]s, never representations.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A typed leaf value stored in a trajectory tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    I64(i64),
    /// Floating point number
    F64(f64),
    /// UTF-8 string
    Str(String),
    /// Free-form JSON payload (annotations, opaque results)
    Json(serde_json::Value),
}

impl Value {
    /// Kind tag of this value
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::I64(_) => ValueKind::I64,
            Value::F64(_) => ValueKind::F64,
            Value::Str(_) => ValueKind::Str,
            Value::Json(_) => ValueKind::Json,
        }
    }

    /// Check kind compatibility with another value
    #[inline]
    #[must_use]
    pub fn same_kind(&self, other: &Value) -> bool {
        self.kind() == other.kind()
    }

    /// Integer accessor
    #[inline]
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Float accessor (integers widen)
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Value::I64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String accessor
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean accessor
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

/// Kind tag for [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Boolean
    Bool,
    /// Signed integer
    I64,
    /// Floating point
    F64,
    /// String
    Str,
    /// JSON payload
    Json,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::I64 => "i64",
            ValueKind::F64 => "f64",
            ValueKind::Str => "str",
            ValueKind::Json => "json",
        };
        write!(f, "{name}")
    }
}
