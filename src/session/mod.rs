//! HTTP-style sessions with sliding expiry.
//!
//! Sessions are kept as records of a dedicated region, so they share the
//! region store's durability. Attribute values are opaque to the store.

pub mod store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::clock::deadline;
use crate::error::{Result, StoreError};
use crate::types::{FieldValue, Identity, Record};

pub use store::SessionStore;

pub const SESSION_TYPE: &str = "Session";

const CREATED_AT: &str = "created_at";
const LAST_ACCESSED: &str = "last_accessed";
const MAX_INACTIVE_MS: &str = "max_inactive_ms";
const ATTRIBUTE_PREFIX: &str = "attr.";

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    max_inactive: Duration,
    attributes: BTreeMap<String, Vec<u8>>,
}

impl Session {
    pub fn new(now: DateTime<Utc>, max_inactive: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_accessed: now,
            max_inactive,
            attributes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn max_inactive(&self) -> Duration {
        self.max_inactive
    }

    pub fn set_max_inactive(&mut self, max_inactive: Duration) {
        self.max_inactive = max_inactive;
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        deadline(self.last_accessed, self.max_inactive)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn raw_attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    pub fn set_raw_attribute(&mut self, name: impl Into<String>, value: Vec<u8>) {
        self.attributes.insert(name.into(), value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Vec<u8>> {
        self.attributes.remove(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub(crate) fn to_record(&self, region: &str) -> Record {
        let mut record = Record::new(region, SESSION_TYPE, self.id.as_str())
            .with_field(CREATED_AT, self.created_at)
            .with_field(LAST_ACCESSED, self.last_accessed)
            .with_field(
                MAX_INACTIVE_MS,
                i64::try_from(self.max_inactive.as_millis()).unwrap_or(i64::MAX),
            );
        for (name, value) in &self.attributes {
            record.set(
                format!("{}{}", ATTRIBUTE_PREFIX, name),
                FieldValue::Bytes(value.clone()),
            );
        }
        record
    }

    /// `record` with only its access time moved to `now`. Attributes
    /// stored by other writers are carried over untouched.
    pub(crate) fn touched(record: &Record, now: DateTime<Utc>) -> Record {
        record.clone().with_field(LAST_ACCESSED, now)
    }

    pub(crate) fn from_record(record: &Record) -> Result<Self> {
        let id = match record.key() {
            Identity::Str(id) => id.clone(),
            other => other.to_string(),
        };
        let timestamp = |name: &str| {
            record
                .field(name)
                .and_then(FieldValue::as_timestamp)
                .ok_or_else(|| {
                    StoreError::validation(format!("session {} has no {} timestamp", id, name))
                })
        };

        let created_at = timestamp(CREATED_AT)?;
        let last_accessed = timestamp(LAST_ACCESSED)?;
        let max_inactive = record
            .field(MAX_INACTIVE_MS)
            .and_then(FieldValue::as_int)
            .map(|ms| Duration::from_millis(ms.max(0) as u64))
            .ok_or_else(|| {
                StoreError::validation(format!("session {} has no inactivity interval", id))
            })?;

        let attributes = record
            .fields()
            .filter_map(|(name, value)| {
                let name = name.strip_prefix(ATTRIBUTE_PREFIX)?;
                match value {
                    FieldValue::Bytes(bytes) => Some((name.to_string(), bytes.clone())),
                    _ => None,
                }
            })
            .collect();

        Ok(Self {
            id,
            created_at,
            last_accessed,
            max_inactive,
            attributes,
        })
    }
}
