//! Wire-level values.
//!
//! Requests carry [`Datum`] arguments and responses are [`Struct`]s of
//! named fields. Field accessors are typed and fallible: a response that
//! does not match the expected schema yields a [`FieldError`] rather than a
//! panic.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::FieldError;

/// Identifies a remote object exported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapId(pub u32);

impl CapId {
    /// The root object every connection starts from.
    pub const BOOTSTRAP: CapId = CapId(0);
}

impl fmt::Display for CapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
    Data(Bytes),
    List(Vec<Datum>),
    Struct(Struct),
    Cap(CapId),
}

impl Datum {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Datum::Bool(_) => "bool",
            Datum::Int(_) => "int",
            Datum::UInt(_) => "uint",
            Datum::Text(_) => "text",
            Datum::Data(_) => "data",
            Datum::List(_) => "list",
            Datum::Struct(_) => "struct",
            Datum::Cap(_) => "capability",
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        Datum::UInt(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_owned())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

impl From<Bytes> for Datum {
    fn from(v: Bytes) -> Self {
        Datum::Data(v)
    }
}

impl From<Struct> for Datum {
    fn from(v: Struct) -> Self {
        Datum::Struct(v)
    }
}

impl From<CapId> for Datum {
    fn from(v: CapId) -> Self {
        Datum::Cap(v)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(v: Vec<T>) -> Self {
        Datum::List(v.into_iter().map(Into::into).collect())
    }
}

/// A set of named fields, ordered by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Struct {
    fields: BTreeMap<String, Datum>,
}

/// The results of a call.
pub type Response = Struct;

macro_rules! typed_accessor {
    ($name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $name(&self, field: &str) -> Result<$ty, FieldError> {
            match self.field(field)? {
                Datum::$variant(v) => Ok(v.clone()),
                other => Err(FieldError::WrongType {
                    field: field.to_owned(),
                    expected: $expected,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Datum>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn field(&self, name: &str) -> Result<&Datum, FieldError> {
        self.fields.get(name).ok_or_else(|| FieldError::Missing {
            field: name.to_owned(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    typed_accessor!(bool, Bool, bool, "bool");
    typed_accessor!(int, Int, i64, "int");
    typed_accessor!(uint, UInt, u64, "uint");
    typed_accessor!(data, Data, Bytes, "data");
    typed_accessor!(cap, Cap, CapId, "capability");

    pub fn text(&self, field: &str) -> Result<&str, FieldError> {
        match self.field(field)? {
            Datum::Text(v) => Ok(v),
            other => Err(self.wrong_type(field, "text", other)),
        }
    }

    pub fn list(&self, field: &str) -> Result<&[Datum], FieldError> {
        match self.field(field)? {
            Datum::List(v) => Ok(v),
            other => Err(self.wrong_type(field, "list", other)),
        }
    }

    pub fn record(&self, field: &str) -> Result<&Struct, FieldError> {
        match self.field(field)? {
            Datum::Struct(v) => Ok(v),
            other => Err(self.wrong_type(field, "struct", other)),
        }
    }

    /// Elements of a list field that must all be structs.
    pub fn records(&self, field: &str) -> Result<Vec<&Struct>, FieldError> {
        self.list(field)?
            .iter()
            .map(|item| match item {
                Datum::Struct(s) => Ok(s),
                other => Err(self.wrong_type(field, "list of struct", other)),
            })
            .collect()
    }

    fn wrong_type(&self, field: &str, expected: &'static str, found: &Datum) -> FieldError {
        FieldError::WrongType {
            field: field.to_owned(),
            expected,
            found: found.kind(),
        }
    }
}

impl FromIterator<(String, Datum)> for Struct {
    fn from_iter<I: IntoIterator<Item = (String, Datum)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
