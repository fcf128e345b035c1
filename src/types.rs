use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Key of a record within its region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Identity {
    Int(i64),
    Str(String),
    Uuid(Uuid),
}

impl Identity {
    /// The empty string is the only identity that stands for "no key".
    pub fn is_null(&self) -> bool {
        matches!(self, Identity::Str(s) if s.is_empty())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(id) => write!(f, "{}", id),
            Identity::Str(id) => write!(f, "{:?}", id),
            Identity::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity::Int(id)
    }
}

impl From<i32> for Identity {
    fn from(id: i32) -> Self {
        Identity::Int(i64::from(id))
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Identity::Str(id.to_string())
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Identity::Str(id)
    }
}

impl From<Uuid> for Identity {
    fn from(id: Uuid) -> Self {
        Identity::Uuid(id)
    }
}

/// Value of a single record field.
///
/// Equality is the natural value equality of each variant. Floats compare
/// and hash by bit pattern so they can key index buckets; timestamps match
/// only on the exact instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    /// Foreign key into another region.
    Ref(Identity),
    /// Ordered foreign keys into another region. Never cascaded.
    RefList(Vec<Identity>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    fn tag(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) => 2,
            FieldValue::Float(_) => 3,
            FieldValue::Text(_) => 4,
            FieldValue::Timestamp(_) => 5,
            FieldValue::Bytes(_) => 6,
            FieldValue::Ref(_) => 7,
            FieldValue::RefList(_) => 8,
            FieldValue::List(_) => 9,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_refs(&self) -> Option<&[Identity]> {
        match self {
            FieldValue::RefList(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Ref(a), FieldValue::Ref(b)) => a == b,
            (FieldValue::RefList(a), FieldValue::RefList(b)) => a == b,
            (FieldValue::List(a), FieldValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.tag());
        match self {
            FieldValue::Null => {}
            FieldValue::Bool(v) => v.hash(state),
            FieldValue::Int(v) => v.hash(state),
            FieldValue::Float(v) => v.to_bits().hash(state),
            FieldValue::Text(v) => v.hash(state),
            FieldValue::Timestamp(v) => v.hash(state),
            FieldValue::Bytes(v) => v.hash(state),
            FieldValue::Ref(v) => v.hash(state),
            FieldValue::RefList(v) => v.hash(state),
            FieldValue::List(v) => v.hash(state),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<Identity> for FieldValue {
    fn from(v: Identity) -> Self {
        FieldValue::Ref(v)
    }
}

impl From<Vec<Identity>> for FieldValue {
    fn from(v: Vec<Identity>) -> Self {
        FieldValue::RefList(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// A keyed, typed entry of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    region: String,
    key: Identity,
    type_name: String,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(
        region: impl Into<String>,
        type_name: impl Into<String>,
        key: impl Into<Identity>,
    ) -> Self {
        Self {
            region: region.into(),
            key: key.into(),
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn key(&self) -> &Identity {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Value used for indexing and equality matching; absent fields match `Null`.
    pub fn field_value(&self, name: &str) -> FieldValue {
        self.fields.get(name).cloned().unwrap_or(FieldValue::Null)
    }

    pub(crate) fn matches(&self, name: &str, value: &FieldValue) -> bool {
        match self.fields.get(name) {
            Some(v) => v == value,
            None => value.is_null(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}
