use std::sync::Arc;
use tracing::trace;

use super::{Query, QueryPlan};
use crate::index::IndexManager;
use crate::region::{RegionState, RegionStore};
use crate::types::{FieldValue, Record};

/// Read-only query front end over a [`RegionStore`].
#[derive(Clone, Copy)]
pub struct QueryEngine<'a> {
    store: &'a RegionStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a RegionStore) -> Self {
        Self { store }
    }

    /// Records of `region` whose `field` equals `value`, in no particular
    /// order. Absent fields compare equal to `FieldValue::Null`.
    pub fn find_by_field(&self, region: &str, field: &str, value: &FieldValue) -> Vec<Record> {
        self.store
            .read(region, |state| match state.indexes().lookup(field, value) {
                Some(keys) => keys
                    .iter()
                    .filter_map(|key| state.get(key))
                    .map(|record| Record::clone(record))
                    .collect(),
                None => state
                    .records()
                    .filter(|record| record.matches(field, value))
                    .cloned()
                    .collect(),
            })
            .unwrap_or_default()
    }

    pub fn explain(&self, query: &Query) -> QueryPlan {
        self.store
            .read(query.region(), |state| plan(query, state.indexes()))
            .unwrap_or(QueryPlan::FullScan)
    }

    pub fn run(&self, query: &Query) -> Vec<Record> {
        let mut found = self
            .store
            .read(query.region(), |state| execute(query, state))
            .unwrap_or_default();

        if query.order_by_key {
            found.sort_by(|a, b| a.key().cmp(b.key()));
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        found
    }
}

fn plan(query: &Query, indexes: &IndexManager) -> QueryPlan {
    query
        .predicates()
        .iter()
        .find(|(field, _)| indexes.has_index(field))
        .map(|(field, _)| QueryPlan::IndexLookup {
            field: field.clone(),
        })
        .unwrap_or(QueryPlan::FullScan)
}

fn execute(query: &Query, state: &RegionState) -> Vec<Record> {
    let plan = plan(query, state.indexes());
    trace!(region = query.region(), ?plan, "running query");

    let matches_all = |record: &Record| {
        query
            .predicates()
            .iter()
            .all(|(field, value)| record.matches(field, value))
    };

    // Without ordering the limit can stop the walk early.
    let cap = if query.order_by_key {
        usize::MAX
    } else {
        query.limit.unwrap_or(usize::MAX)
    };

    match plan {
        QueryPlan::IndexLookup { field } => {
            let Some((_, value)) = query.predicates().iter().find(|(f, _)| *f == field) else {
                return Vec::new();
            };
            let keys = state.indexes().lookup(&field, value).unwrap_or_default();
            keys.iter()
                .filter_map(|key| state.get(key))
                .map(Arc::as_ref)
                .filter(|&record| matches_all(record))
                .take(cap)
                .cloned()
                .collect()
        }
        QueryPlan::FullScan => state
            .records()
            .filter(|&record| matches_all(record))
            .take(cap)
            .cloned()
            .collect(),
    }
}
