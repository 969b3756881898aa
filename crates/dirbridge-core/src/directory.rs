//! Directory entry model
//!
//! A directory entry is a set of attribute name to value pairs plus the
//! entry's distinguished name. Values arrive in three shapes: a bare scalar,
//! a plain list (what native clients return), or the counted structure used
//! by the directory protocol's array encoding.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key of the count marker in the counted wire form
const COUNT_KEY: &str = "count";

/// Raw value of a directory attribute.
///
/// On the wire the counted form is an object holding an optional `count`
/// marker and positional elements under the keys `"0"`, `"1"`, ...
/// (`{"count": 2, "0": "x", "1": "Admins", "2": "Users"}`). An explicit
/// `values` array is accepted in place of the positional keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Scalar(String),
    List(Vec<String>),
    /// `count` is the protocol's count marker; `values` are the positional
    /// elements in index order.
    Counted {
        count: Option<usize>,
        values: Vec<String>,
    },
}

/// An attribute value after applying the multi-value decoding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Scalar(String),
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Decode the value.
    ///
    /// Counted structures without a count marker, or with a count of one,
    /// yield their first element as a scalar. Any other count yields every
    /// element after the leading slot.
    pub fn decode(&self) -> Option<DecodedValue> {
        match self {
            Self::Scalar(s) => Some(DecodedValue::Scalar(s.clone())),
            Self::List(values) => match values.as_slice() {
                [] => None,
                [single] => Some(DecodedValue::Scalar(single.clone())),
                many => Some(DecodedValue::Multi(many.to_vec())),
            },
            Self::Counted { count, values } => match count {
                None | Some(1) => values.first().cloned().map(DecodedValue::Scalar),
                Some(_) => Some(DecodedValue::Multi(
                    values.iter().skip(1).cloned().collect(),
                )),
            },
        }
    }

    /// Build an attribute value from a field value read off a local record
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::List(vec![]),
            Value::String(s) => Self::Scalar(s.clone()),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Bool(b) => Self::Scalar(if *b { "TRUE" } else { "FALSE" }.to_string()),
            other => Self::Scalar(other.to_string()),
        }
    }

    /// All raw strings carried by the value
    pub fn raw_values(&self) -> Vec<String> {
        match self {
            Self::Scalar(s) => vec![s.clone()],
            Self::List(values) | Self::Counted { values, .. } => values.clone(),
        }
    }
}

fn element_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn counted_from_object<E: de::Error>(object: Map<String, Value>) -> Result<AttributeValue, E> {
    let count = match object.get(COUNT_KEY) {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| E::custom("count must be a non-negative integer"))?,
        ),
    };

    if let Some(values) = object.get("values") {
        let values = values
            .as_array()
            .ok_or_else(|| E::custom("values must be an array"))?
            .iter()
            .map(|v| element_text(v).ok_or_else(|| E::custom("values must be scalars")))
            .collect::<Result<Vec<_>, E>>()?;
        return Ok(AttributeValue::Counted { count, values });
    }

    let mut positional = BTreeMap::new();
    for (key, value) in &object {
        if key == COUNT_KEY {
            continue;
        }
        let index: usize = key
            .parse()
            .map_err(|_| E::custom(format!("unexpected key '{}' in counted value", key)))?;
        let text = element_text(value)
            .ok_or_else(|| E::custom(format!("element '{}' must be a scalar", key)))?;
        positional.insert(index, text);
    }

    Ok(AttributeValue::Counted {
        count,
        values: positional.into_values().collect(),
    })
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self::Scalar(s)),
            Value::Array(items) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| {
                    element_text(v)
                        .ok_or_else(|| de::Error::custom("list elements must be scalars"))
                })
                .collect::<Result<Vec<_>, D::Error>>()
                .map(Self::List),
            Value::Object(object) => counted_from_object(object),
            other => element_text(&other)
                .map(Self::Scalar)
                .ok_or_else(|| de::Error::custom("attribute value cannot be null")),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Scalar(s) => serializer.serialize_str(s),
            Self::List(values) => values.serialize(serializer),
            Self::Counted { count, values } => {
                let mut map = serializer.serialize_map(Some(values.len() + 1))?;
                if let Some(count) = count {
                    map.serialize_entry(COUNT_KEY, count)?;
                }
                for (index, value) in values.iter().enumerate() {
                    map.serialize_entry(&index.to_string(), value)?;
                }
                map.end()
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl DecodedValue {
    pub fn into_values(self) -> Vec<String> {
        match self {
            Self::Scalar(s) => vec![s],
            Self::Multi(values) => values,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(s) => Value::String(s.clone()),
            Self::Multi(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// A single entry read from, or written to, the directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Set on every entry returned by a successful read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl DirectoryEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dn(dn: impl Into<String>) -> Self {
        Self {
            dn: Some(dn.into()),
            attributes: BTreeMap::new(),
        }
    }

    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up an attribute. Attribute names are case-insensitive in the
    /// directory, so an exact match is tried first and an ASCII
    /// case-insensitive one second.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn decode(&self, name: &str) -> Option<DecodedValue> {
        self.get(name).and_then(AttributeValue::decode)
    }
}
