//! # Value Module
//!
//! The closed set of attribute values that flow through timelines, registries
//! and the scripting boundary.
//!
//! ## Key Types
//! - `Value`: tagged union (void, int, float, bool, text, vectors, bytes, arrays,
//!   attribute references).
//! - `ValueKind`: the discriminant, used to declare the expected type of a
//!   modifier action's result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative tolerance used by [`Value::approx_eq`] when no explicit epsilon is given.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Discriminant of a [`Value`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Void,
    Int,
    Float,
    Bool,
    Text,
    Vector2,
    Vector3,
    Vector4,
    Bytes,
    Array,
    AttributeRef,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Void => "void",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
            ValueKind::Vector2 => "vector2",
            ValueKind::Vector3 => "vector3",
            ValueKind::Vector4 => "vector4",
            ValueKind::Bytes => "bytes",
            ValueKind::Array => "array",
            ValueKind::AttributeRef => "attribute_ref",
        };
        f.write_str(name)
    }
}

/// A typed attribute value.
///
/// `AttributeRef` names another attribute; modifier actions resolve it against
/// the ancestor attribute stack each time they run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Void,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Vector2([f64; 2]),
    Vector3([f64; 3]),
    Vector4([f64; 4]),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    AttributeRef(String),
}

impl Value {
    /// Returns the coarse kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::Vector2(_) => ValueKind::Vector2,
            Value::Vector3(_) => ValueKind::Vector3,
            Value::Vector4(_) => ValueKind::Vector4,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Array(_) => ValueKind::Array,
            Value::AttributeRef(_) => ValueKind::AttributeRef,
        }
    }

    pub fn vec2(x: f64, y: f64) -> Self {
        Value::Vector2([x, y])
    }

    pub fn vec3(x: f64, y: f64, z: f64) -> Self {
        Value::Vector3([x, y, z])
    }

    pub fn vec4(x: f64, y: f64, z: f64, w: f64) -> Self {
        Value::Vector4([x, y, z, w])
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Approximate equality with the default tolerance.
    pub fn approx_eq(&self, other: &Value) -> bool {
        self.approx_eq_within(other, DEFAULT_TOLERANCE)
    }

    /// Approximate equality.
    ///
    /// Floats and vector components compare with `epsilon` scaled by the larger
    /// magnitude (never below `epsilon` itself). Arrays compare element-wise.
    /// Every other kind, including mismatched kinds, uses exact equality.
    pub fn approx_eq_within(&self, other: &Value, epsilon: f64) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => float_close(*a, *b, epsilon),
            (Value::Vector2(a), Value::Vector2(b)) => components_close(a, b, epsilon),
            (Value::Vector3(a), Value::Vector3(b)) => components_close(a, b, epsilon),
            (Value::Vector4(a), Value::Vector4(b)) => components_close(a, b, epsilon),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.approx_eq_within(y, epsilon))
            }
            _ => self == other,
        }
    }
}

fn float_close(a: f64, b: f64, epsilon: f64) -> bool {
    if a == b {
        return true;
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= epsilon * scale
}

fn components_close(a: &[f64], b: &[f64], epsilon: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| float_close(*x, *y, epsilon))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("()"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Vector2([x, y]) => write!(f, "({}, {})", x, y),
            Value::Vector3([x, y, z]) => write!(f, "({}, {}, {})", x, y, z),
            Value::Vector4([x, y, z, w]) => write!(f, "({}, {}, {}, {})", x, y, z, w),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::AttributeRef(name) => write!(f, "@{}", name),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_tolerance_scales_with_magnitude() {
        assert!(Value::Float(1000.0).approx_eq(&Value::Float(1000.0 + 1e-4)));
        assert!(!Value::Float(1.0).approx_eq(&Value::Float(1.0 + 1e-4)));
        assert!(Value::Float(0.0).approx_eq(&Value::Float(1e-7)));
    }

    #[test]
    fn vectors_compare_per_component() {
        let a = Value::vec3(0.1, 0.2, 0.3);
        let b = Value::vec3(0.1 + 1e-9, 0.2, 0.3 - 1e-9);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&Value::vec3(0.1, 0.25, 0.3)));
    }

    #[test]
    fn mismatched_kinds_are_never_equal() {
        assert!(!Value::Int(1).approx_eq(&Value::Float(1.0)));
        assert!(!Value::vec2(1.0, 2.0).approx_eq(&Value::vec3(1.0, 2.0, 0.0)));
    }

    #[test]
    fn text_and_bool_use_exact_equality() {
        assert!(Value::text("a").approx_eq(&Value::text("a")));
        assert!(!Value::text("a").approx_eq(&Value::text("b")));
        assert!(!Value::Bool(true).approx_eq(&Value::Bool(false)));
    }

    #[test]
    fn nan_is_not_close_to_anything() {
        assert!(!Value::Float(f64::NAN).approx_eq(&Value::Float(f64::NAN)));
        assert!(Value::Float(f64::INFINITY).approx_eq(&Value::Float(f64::INFINITY)));
    }

    #[test]
    fn serde_uses_tagged_layout() {
        let json = serde_json::to_string(&Value::vec2(1.0, 2.0)).unwrap();
        assert_eq!(json, r#"{"type":"vector2","data":[1.0,2.0]}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::vec2(1.0, 2.0));
    }
}
