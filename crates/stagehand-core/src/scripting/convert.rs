//! # Value Conversion
//!
//! Moves [`Value`]s across the Rhai boundary.
//!
//! Vectors travel as arrays of floats. On the way back a vector may be written
//! either as an array of 2/3/4 numbers or as an object map with `x`/`y`/`z`/`w`.

use crate::errors::ScriptError;
use crate::value::{Value, ValueKind};
use rhai::{Array, Dynamic, Map, FLOAT, INT};

pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Void => Dynamic::UNIT,
        Value::Int(i) => Dynamic::from_int(*i as INT),
        Value::Float(f) => Dynamic::from_float(*f as FLOAT),
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Vector2(v) => float_array(v),
        Value::Vector3(v) => float_array(v),
        Value::Vector4(v) => float_array(v),
        Value::Bytes(b) => Dynamic::from_blob(b.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::AttributeRef(name) => Dynamic::from(name.clone()),
    }
}

fn float_array(components: &[f64]) -> Dynamic {
    Dynamic::from_array(
        components
            .iter()
            .map(|c| Dynamic::from_float(*c as FLOAT))
            .collect(),
    )
}

fn mismatch(expected: ValueKind, found: &Dynamic) -> ScriptError {
    ScriptError::Conversion {
        expected,
        found: found.type_name().to_string(),
    }
}

fn number(d: &Dynamic) -> Option<f64> {
    if let Ok(f) = d.as_float() {
        return Some(f as f64);
    }
    d.as_int().ok().map(|i| i as f64)
}

fn vector<const N: usize>(d: Dynamic, expected: ValueKind) -> Result<[f64; N], ScriptError> {
    const AXES: [&str; 4] = ["x", "y", "z", "w"];
    let mut out = [0.0; N];

    if d.is_array() {
        let items = d
            .clone()
            .into_array()
            .map_err(|_| mismatch(expected, &d))?;
        if items.len() != N {
            return Err(ScriptError::Conversion {
                expected,
                found: format!("array of {} elements", items.len()),
            });
        }
        for (slot, item) in out.iter_mut().zip(items.iter()) {
            *slot = number(item).ok_or_else(|| mismatch(expected, item))?;
        }
        return Ok(out);
    }

    if d.is_map() {
        let map = d.clone().cast::<Map>();
        for (slot, axis) in out.iter_mut().zip(AXES.iter()) {
            let item = map.get(*axis).ok_or_else(|| ScriptError::Conversion {
                expected,
                found: format!("map without '{}'", axis),
            })?;
            *slot = number(item).ok_or_else(|| mismatch(expected, item))?;
        }
        return Ok(out);
    }

    Err(mismatch(expected, &d))
}

/// Converts a script result into a value of the declared kind.
pub fn to_value(d: Dynamic, expected: ValueKind) -> Result<Value, ScriptError> {
    match expected {
        ValueKind::Void => Ok(Value::Void),
        ValueKind::Int => {
            if let Ok(i) = d.as_int() {
                return Ok(Value::Int(i as i64));
            }
            match d.as_float() {
                Ok(f) if (f as f64).fract() == 0.0 => Ok(Value::Int(f as i64)),
                _ => Err(mismatch(expected, &d)),
            }
        }
        ValueKind::Float => number(&d)
            .map(Value::Float)
            .ok_or_else(|| mismatch(expected, &d)),
        ValueKind::Bool => d
            .as_bool()
            .map(Value::Bool)
            .map_err(|_| mismatch(expected, &d)),
        ValueKind::Text => {
            if let Ok(c) = d.as_char() {
                return Ok(Value::Text(c.to_string()));
            }
            d.clone()
                .into_string()
                .map(Value::Text)
                .map_err(|_| mismatch(expected, &d))
        }
        ValueKind::Vector2 => vector::<2>(d, expected).map(Value::Vector2),
        ValueKind::Vector3 => vector::<3>(d, expected).map(Value::Vector3),
        ValueKind::Vector4 => vector::<4>(d, expected).map(Value::Vector4),
        ValueKind::Bytes => {
            if d.is_blob() {
                return d
                    .clone()
                    .into_blob()
                    .map(Value::Bytes)
                    .map_err(|_| mismatch(expected, &d));
            }
            let items = d
                .clone()
                .into_array()
                .map_err(|_| mismatch(expected, &d))?;
            items
                .iter()
                .map(|item| match item.as_int() {
                    Ok(b) if (0..=255).contains(&b) => Ok(b as u8),
                    _ => Err(mismatch(expected, item)),
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Value::Bytes)
        }
        ValueKind::Array => {
            let items: Array = d
                .clone()
                .into_array()
                .map_err(|_| mismatch(expected, &d))?;
            items
                .into_iter()
                .map(infer_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        ValueKind::AttributeRef => d
            .clone()
            .into_string()
            .map(Value::AttributeRef)
            .map_err(|_| mismatch(expected, &d)),
    }
}

/// Converts a script result without a declared kind.
///
/// Arrays stay arrays; they are never guessed to be vectors.
pub fn infer_value(d: Dynamic) -> Result<Value, ScriptError> {
    if d.is_unit() {
        Ok(Value::Void)
    } else if d.is_int() {
        to_value(d, ValueKind::Int)
    } else if d.is_float() {
        to_value(d, ValueKind::Float)
    } else if d.is_bool() {
        to_value(d, ValueKind::Bool)
    } else if d.is_string() || d.is_char() {
        to_value(d, ValueKind::Text)
    } else if d.is_blob() {
        to_value(d, ValueKind::Bytes)
    } else if d.is_array() {
        to_value(d, ValueKind::Array)
    } else {
        Err(mismatch(ValueKind::Void, &d))
    }
}
