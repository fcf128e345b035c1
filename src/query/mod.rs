//! Field-equality queries over regions.
//!
//! Lookups drive from a secondary index when one is declared on a queried
//! field and fall back to a filtered scan otherwise. Either way the whole
//! query runs under a single region read lock.

pub mod engine;


use crate::types::FieldValue;

pub use engine::QueryEngine;

/// How a query will be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Keys come from the index on `field`, remaining predicates filter.
    IndexLookup { field: String },
    FullScan,
}

/// Conjunction of field-equality predicates over one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    region: String,
    predicates: Vec<(String, FieldValue)>,
    order_by_key: bool,
    limit: Option<usize>,
}

impl Query {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            predicates: Vec::new(),
            order_by_key: false,
            limit: None,
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.predicates.push((field.into(), value.into()));
        self
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by_key = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn predicates(&self) -> &[(String, FieldValue)] {
        &self.predicates
    }
}
