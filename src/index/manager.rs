use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error};

use crate::error::{Result, StoreError};
use crate::types::{FieldValue, Identity, Record};

/// `field value -> keys` for one field of one region.
#[derive(Debug, Clone, Default)]
pub struct SecondaryIndex {
    field: String,
    buckets: HashMap<FieldValue, HashSet<Identity>>,
}

impl SecondaryIndex {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            buckets: HashMap::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn bucket(&self, value: &FieldValue) -> Option<&HashSet<Identity>> {
        self.buckets.get(value)
    }

    /// Number of distinct indexed values.
    pub fn cardinality(&self) -> usize {
        self.buckets.len()
    }

    /// Number of indexed keys across all buckets.
    pub fn entries(&self) -> usize {
        self.buckets.values().map(HashSet::len).sum()
    }

    fn contains(&self, value: &FieldValue, key: &Identity) -> bool {
        self.buckets.get(value).is_some_and(|keys| keys.contains(key))
    }

    fn insert(&mut self, value: FieldValue, key: Identity) {
        self.buckets.entry(value).or_default().insert(key);
    }

    fn remove(&mut self, value: &FieldValue, key: &Identity) {
        if let Some(keys) = self.buckets.get_mut(value) {
            keys.remove(key);
            if keys.is_empty() {
                self.buckets.remove(value);
            }
        }
    }
}

/// All secondary indexes of a single region.
#[derive(Debug, Clone)]
pub struct IndexManager {
    region: String,
    indexes: BTreeMap<String, SecondaryIndex>,
}

impl IndexManager {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    pub fn index(&self, field: &str) -> Option<&SecondaryIndex> {
        self.indexes.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Declares an index on `field`, building it from `records`.
    /// Returns `false` when the index already existed.
    pub fn declare<'a>(
        &mut self,
        field: &str,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> bool {
        if self.indexes.contains_key(field) {
            return false;
        }

        let mut index = SecondaryIndex::new(field);
        for record in records {
            index.insert(record.field_value(field), record.key().clone());
        }
        debug!(
            region = %self.region,
            field,
            entries = index.entries(),
            "declared index"
        );
        self.indexes.insert(field.to_string(), index);
        true
    }

    pub fn drop_index(&mut self, field: &str) -> bool {
        self.indexes.remove(field).is_some()
    }

    /// Keys whose `field` equals `value`. `None` when `field` is not indexed.
    pub fn lookup(&self, field: &str, value: &FieldValue) -> Option<HashSet<Identity>> {
        self.indexes
            .get(field)
            .map(|index| index.bucket(value).cloned().unwrap_or_default())
    }

    /// Moves `key` between buckets for a put. Nothing changes on error.
    pub fn on_put(&mut self, key: &Identity, old: Option<&Record>, new: &Record) -> Result<()> {
        self.check_put(key, old, new)?;
        self.apply_put(key, old, new);
        Ok(())
    }

    /// Removes `key` from every bucket for a delete. Nothing changes on error.
    pub fn on_delete(&mut self, key: &Identity, record: &Record) -> Result<()> {
        self.check_delete(key, record)?;
        self.apply_delete(key, record);
        Ok(())
    }

    /// Verifies that the buckets agree with `old` before a put.
    pub fn check_put(&self, key: &Identity, old: Option<&Record>, new: &Record) -> Result<()> {
        for index in self.indexes.values() {
            match old {
                Some(old) => {
                    let old_value = old.field_value(&index.field);
                    if !index.contains(&old_value, key) {
                        return Err(self.inconsistency(
                            &index.field,
                            key,
                            format!("key missing from bucket {:?}", old_value),
                        ));
                    }
                }
                None => {
                    let new_value = new.field_value(&index.field);
                    if index.contains(&new_value, key) {
                        return Err(self.inconsistency(
                            &index.field,
                            key,
                            format!("absent key already in bucket {:?}", new_value),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies a put that already passed [`IndexManager::check_put`].
    pub fn apply_put(&mut self, key: &Identity, old: Option<&Record>, new: &Record) {
        for index in self.indexes.values_mut() {
            let new_value = new.field_value(&index.field);
            if let Some(old) = old {
                let old_value = old.field_value(&index.field);
                if old_value == new_value {
                    continue;
                }
                index.remove(&old_value, key);
            }
            index.insert(new_value, key.clone());
        }
    }

    pub fn check_delete(&self, key: &Identity, record: &Record) -> Result<()> {
        for index in self.indexes.values() {
            let value = record.field_value(&index.field);
            if !index.contains(&value, key) {
                return Err(self.inconsistency(
                    &index.field,
                    key,
                    format!("deleted key missing from bucket {:?}", value),
                ));
            }
        }
        Ok(())
    }

    pub fn apply_delete(&mut self, key: &Identity, record: &Record) {
        for index in self.indexes.values_mut() {
            let value = record.field_value(&index.field);
            index.remove(&value, key);
        }
    }

    /// Checks every index against the full contents of the region.
    pub fn verify<'a>(&self, records: impl IntoIterator<Item = &'a Record> + Clone) -> Result<()> {
        for index in self.indexes.values() {
            let mut expected = 0usize;
            for record in records.clone() {
                expected += 1;
                let value = record.field_value(&index.field);
                if !index.contains(&value, record.key()) {
                    return Err(self.inconsistency(
                        &index.field,
                        record.key(),
                        format!("live key missing from bucket {:?}", value),
                    ));
                }
            }
            // Each live key sits in exactly one bucket, so any surplus is a stale key.
            let actual = index.entries();
            if actual != expected {
                let live: HashSet<&Identity> = records.clone().into_iter().map(Record::key).collect();
                let stale = index
                    .buckets
                    .values()
                    .flatten()
                    .find(|key| !live.contains(key))
                    .cloned()
                    .unwrap_or(Identity::Str(String::new()));
                return Err(self.inconsistency(
                    &index.field,
                    &stale,
                    format!("{} indexed keys for {} live records", actual, expected),
                ));
            }
        }
        Ok(())
    }

    /// Empties every bucket, keeping the declarations.
    pub fn clear(&mut self) {
        for index in self.indexes.values_mut() {
            index.buckets.clear();
        }
    }

    fn inconsistency(&self, field: &str, key: &Identity, detail: String) -> StoreError {
        error!(region = %self.region, field, key = %key, %detail, "index inconsistency");
        StoreError::IndexInconsistency {
            region: self.region.clone(),
            field: field.to_string(),
            key: key.clone(),
            detail,
        }
    }
}
