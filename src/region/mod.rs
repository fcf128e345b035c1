//! Named regions of keyed records.
//!
//! Each region sits behind one `RwLock` that guards both its records and its
//! [`IndexManager`]. Writers hold it for the whole mutation (validation,
//! log append, record swap, index update), so a reader either sees the
//! mutation completely or not at all.

pub mod scan;
pub mod store;
pub mod wal;


use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::EntityCodec;
use crate::index::IndexManager;
use crate::types::{Identity, Record};

pub use scan::RegionScan;
pub use store::RegionStore;
pub use wal::{WalEntry, WriteAheadLog};

pub struct Region {
    name: String,
    codec: EntityCodec,
    state: RwLock<RegionState>,
}

pub struct RegionState {
    records: HashMap<Identity, Arc<Record>>,
    indexes: IndexManager,
    record_type: Option<String>,
    dropped: bool,
}

impl Region {
    pub(crate) fn new(name: &str, codec: EntityCodec, record_type: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            codec,
            state: RwLock::new(RegionState {
                records: HashMap::new(),
                indexes: IndexManager::new(name),
                record_type,
                dropped: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn codec(&self) -> &EntityCodec {
        &self.codec
    }

    pub(crate) fn state(&self) -> &RwLock<RegionState> {
        &self.state
    }
}

impl RegionState {
    pub fn get(&self, key: &Identity) -> Option<&Arc<Record>> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> + Clone {
        self.records.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    pub fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Record>> {
        self.records.values().cloned().collect()
    }
}
