//! UI-facing values.
//!
//! A [`Value`] is what a [`Promise`](crate::Promise) is fulfilled with: an
//! ordered list of JSON-compatible scalars and records. It serializes
//! without variant tags, so `Value::List(vec![Value::Int(5)])` becomes `[5]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Datum, ProjectionError, Struct};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Binary payloads are surfaced as lower-case hex strings.
    pub fn hex(bytes: impl AsRef<[u8]>) -> Self {
        Value::String(hex::encode(bytes))
    }

    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Unsigned wire integers must fit the signed 64-bit UI integer.
    pub fn from_u64(value: u64) -> Result<Self, ProjectionError> {
        i64::try_from(value)
            .map(Value::Int)
            .map_err(|_| ProjectionError::IntegerOverflow { value })
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Every variant maps onto JSON directly, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(map) => map.get(key),
            _ => None,
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
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl TryFrom<&Datum> for Value {
    type Error = ProjectionError;

    fn try_from(datum: &Datum) -> Result<Self, Self::Error> {
        Ok(match datum {
            Datum::Bool(v) => Value::Bool(*v),
            Datum::Int(v) => Value::Int(*v),
            Datum::UInt(v) => Value::from_u64(*v)?,
            Datum::Text(v) => Value::String(v.clone()),
            Datum::Data(v) => Value::hex(v),
            Datum::List(items) => Value::List(
                items
                    .iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Datum::Struct(s) => Value::try_from(s)?,
            Datum::Cap(_) => return Err(ProjectionError::Capability),
        })
    }
}

impl TryFrom<&Struct> for Value {
    type Error = ProjectionError;

    fn try_from(s: &Struct) -> Result<Self, Self::Error> {
        s.iter()
            .map(|(k, v)| Ok((k.to_owned(), Value::try_from(v)?)))
            .collect::<Result<BTreeMap<_, _>, ProjectionError>>()
            .map(Value::Record)
    }
}
