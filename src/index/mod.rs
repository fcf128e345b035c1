//! Secondary indexes over record fields.
//!
//! Each region owns one [`IndexManager`]. The region store calls it while
//! holding the region's write lock, so a mutation and its index update are
//! always observed together. Every update is checked against the current
//! buckets before anything is changed: a mismatch aborts the mutation with
//! [`StoreError::IndexInconsistency`](crate::error::StoreError::IndexInconsistency) and leaves the indexes untouched.

pub mod manager;


pub use manager::{IndexManager, SecondaryIndex};
