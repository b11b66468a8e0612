// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed decoding of OTLP/JSON attribute lists.
//!
//! OTLP/JSON stores attributes as an ordered list of
//! `{"key": "name", "value": {"stringValue": "foo"}}` entries. Keys may repeat;
//! lookups return the first entry whose value decodes.

use std::fmt;

use serde::{Deserialize, Deserializer};

/// A decoded attribute value.
///
/// The wire format is a loosely-typed object where exactly one of
/// `stringValue`, `intValue`, `doubleValue`, `boolValue` or `arrayValue` is
/// expected to be set. Anything else decodes to [`AttrValue::Empty`].
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "WireValue")]
pub enum AttrValue {
    #[default]
    Empty,
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Array(Vec<AttrValue>),
}

impl AttrValue {
    /// Get the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get an integer view of numeric values (doubles truncate, numeric strings parse).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Double(d) if d.is_finite() => Some(*d as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a floating-point view of numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view: `true`, or the string `"true"` in any case.
    pub fn as_bool_like(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Str(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Scalar values rendered as text. Empty strings, arrays and missing values yield `None`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Str(s) if !s.is_empty() => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Double(d) => Some(d.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Whether the value carries anything at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Convert to a plain JSON value for storage.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Empty => serde_json::Value::Null,
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Double(d) => serde_json::Value::from(*d),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Array(values) => {
                serde_json::Value::Array(values.iter().map(AttrValue::to_json).collect())
            }
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Double(d) => write!(f, "{}", d),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Array(_) => write!(f, "{}", self.to_json()),
        }
    }
}

/// One `{key, value}` entry of an attribute list.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawAttribute {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: AttrValue,
}

impl RawAttribute {
    /// Create an attribute (mostly useful for building fixtures).
    pub fn new(key: impl Into<String>, value: AttrValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

// ============================================================================
// LOOKUPS
// ============================================================================

/// First decodable value for `key`.
pub fn value_of<'a>(attributes: &'a [RawAttribute], key: &str) -> Option<&'a AttrValue> {
    attributes
        .iter()
        .filter(|attr| attr.key == key)
        .map(|attr| &attr.value)
        .find(|value| !value.is_empty())
}

/// Whether `key` appears at all, regardless of its value.
pub fn has_attribute(attributes: &[RawAttribute], key: &str) -> bool {
    attributes.iter().any(|attr| attr.key == key)
}

/// Scalar value for `key` as text, skipping empty strings.
pub fn text_of(attributes: &[RawAttribute], key: &str) -> Option<String> {
    value_of(attributes, key).and_then(AttrValue::to_text)
}

/// First key in `keys` that has a non-empty scalar value.
pub fn first_text_of(attributes: &[RawAttribute], keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text_of(attributes, key))
}

/// Integer value for `key`.
pub fn int_of(attributes: &[RawAttribute], key: &str) -> Option<i64> {
    value_of(attributes, key).and_then(AttrValue::as_i64)
}

/// First key in `keys` with a non-zero integer value.
pub fn first_nonzero_int_of(attributes: &[RawAttribute], keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| int_of(attributes, key))
        .find(|value| *value != 0)
}

/// Floating-point value for `key`.
pub fn float_of(attributes: &[RawAttribute], key: &str) -> Option<f64> {
    value_of(attributes, key).and_then(AttrValue::as_f64)
}

// ============================================================================
// WIRE DECODING
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireValue {
    string_value: Option<String>,
    #[serde(deserialize_with = "de::lenient_i64")]
    int_value: Option<i64>,
    #[serde(deserialize_with = "de::lenient_f64")]
    double_value: Option<f64>,
    bool_value: Option<bool>,
    array_value: Option<WireArray>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireArray {
    values: Vec<WireValue>,
}

impl WireValue {
    fn into_primitive(self) -> AttrValue {
        if let Some(s) = self.string_value {
            AttrValue::Str(s)
        } else if let Some(i) = self.int_value {
            AttrValue::Int(i)
        } else if let Some(d) = self.double_value {
            AttrValue::Double(d)
        } else if let Some(b) = self.bool_value {
            AttrValue::Bool(b)
        } else {
            AttrValue::Empty
        }
    }
}

impl From<WireValue> for AttrValue {
    fn from(mut wire: WireValue) -> Self {
        match wire.array_value.take() {
            Some(array)
                if wire.string_value.is_none()
                    && wire.int_value.is_none()
                    && wire.double_value.is_none()
                    && wire.bool_value.is_none() =>
            {
                // Arrays only carry primitives; nested arrays decode to Empty.
                AttrValue::Array(array.values.into_iter().map(WireValue::into_primitive).collect())
            }
            _ => wire.into_primitive(),
        }
    }
}

/// Lenient number decoders. OTLP/JSON encodes 64-bit integers as strings.
pub(crate) mod de {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Int(i64),
        Unsigned(u64),
        Float(f64),
        Text(String),
    }

    pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<NumberOrString>::deserialize(d)? {
            Some(NumberOrString::Int(i)) => Some(i),
            Some(NumberOrString::Unsigned(u)) => i64::try_from(u).ok(),
            Some(NumberOrString::Float(f)) if f.is_finite() => Some(f as i64),
            Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(match Option::<NumberOrString>::deserialize(d)? {
            Some(NumberOrString::Int(i)) => u64::try_from(i).ok(),
            Some(NumberOrString::Unsigned(u)) => Some(u),
            Some(NumberOrString::Float(f)) if f.is_finite() && f >= 0.0 => Some(f as u64),
            Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub(crate) fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<NumberOrString>::deserialize(d)? {
            Some(NumberOrString::Int(i)) => Some(i as f64),
            Some(NumberOrString::Unsigned(u)) => Some(u as f64),
            Some(NumberOrString::Float(f)) => Some(f),
            Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
            None => None,
        })
    }
}
