//! Flattening of nested result trees into `path -> scalar` maps.
//!
//! Object keys are joined with `.`; array elements are addressed either as
//! `.N` (plot data) or `[N]` (combined property text). `null` leaves are
//! dropped, so optional measurements that were not taken never show up as
//! plot series.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Flattened view of a result tree. Values are always scalars.
pub type FlatMap = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexStyle {
    /// `a.c.0`
    #[default]
    Dotted,
    /// `a.c[0]`
    Bracketed,
}

pub fn flatten(value: &Value) -> FlatMap {
    flatten_with(value, IndexStyle::Dotted)
}

pub fn flatten_with(value: &Value, style: IndexStyle) -> FlatMap {
    let mut dst = FlatMap::new();
    flatten_into(String::new(), value, style, &mut dst);
    dst
}

/// Serialize `data` and flatten the result.
pub fn flatten_serialize<T: Serialize>(
    data: &T,
    style: IndexStyle,
) -> serde_json::Result<FlatMap> {
    Ok(flatten_with(&serde_json::to_value(data)?, style))
}

fn flatten_into(prefix: String, value: &Value, style: IndexStyle, dst: &mut FlatMap) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(path, child, style, dst);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let path = match style {
                    IndexStyle::Dotted => format!("{prefix}.{i}"),
                    IndexStyle::Bracketed => format!("{prefix}[{i}]"),
                };
                flatten_into(path, child, style, dst);
            }
        }
        // Strings are leaves even though they could be iterated.
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            dst.insert(prefix, value.clone());
        }
    }
}
