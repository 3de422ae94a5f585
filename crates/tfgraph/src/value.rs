//! resolved value representation
//!
//! The walker output model contains the following data types
//! - null (only ever at the top level, e.g. a variable without a default)
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//! - interpolation (a parsed template that still references other values)
//!
//! Interpolations are kept unevaluated. Substituting them is up to whoever consumes the graph.
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// All possible value types
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Interpolation(Interpolation),
}

impl Value {
    pub fn as_interpolation(&self) -> Option<&Interpolation> {
        match self {
            Value::Interpolation(interpolation) => Some(interpolation),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

/// An interpolation string that was parsed but not evaluated
///
/// Keeps the original source text next to the parsed [hcl::Template] so the expression can be reported
/// (and serialized) exactly as it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    source: String,
    template: hcl::Template,
}

impl Interpolation {
    pub(crate) fn new(source: impl Into<String>, template: hcl::Template) -> Self {
        Self {
            source: source.into(),
            template,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn template(&self) -> &hcl::Template {
        &self.template
    }
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Object(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            Value::Interpolation(value) => serializer.serialize_str(value.source()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interpolations_serialize_as_their_source() {
        let template: hcl::Template = "${var.x}-suffix".parse().unwrap();
        let value: Value = [
            ("name", Value::Interpolation(Interpolation::new("${var.x}-suffix", template))),
            ("ports", vec![80i64, 443].into()),
            ("enabled", true.into()),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "${var.x}-suffix",
                "ports": [80, 443],
                "enabled": true,
            })
        );
    }

    #[test]
    fn null_serializes_as_null() {
        assert_eq!(
            serde_json::to_string(&Value::Null).unwrap(),
            "null".to_string()
        );
    }
}
