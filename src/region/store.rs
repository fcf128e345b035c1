use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{Region, RegionScan, RegionState, WalEntry, WriteAheadLog};
use crate::codec::EntityCodec;
use crate::config::{Persistence, RegionConfig, StoreConfig};
use crate::error::{Result, StoreError};
use crate::types::{FieldValue, Identity, Record};

/// Key/record storage for every region, with synchronous index maintenance.
pub struct RegionStore {
    regions: RwLock<HashMap<String, Arc<Region>>>,
    /// Regions declared at open; dropping one resets it to this declaration.
    declared: HashMap<String, RegionConfig>,
    auto_create: bool,
    codec: EntityCodec,
    wal: Option<Mutex<WriteAheadLog>>,
}

impl RegionStore {
    /// Opens a store: declares the configured regions, then replays the
    /// write-ahead log in durable mode.
    #[instrument(skip(config), fields(regions = config.regions.len()))]
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut store = Self {
            regions: RwLock::new(HashMap::new()),
            declared: config
                .regions
                .iter()
                .map(|region| (region.name.clone(), region.clone()))
                .collect(),
            auto_create: config.auto_create_regions,
            codec: config.codec.codec(),
            wal: None,
        };

        for region in &config.regions {
            store.install(region);
        }

        if let Persistence::Durable { dir, sync_on_write } = &config.persistence {
            let wal = WriteAheadLog::open(dir, store.codec, *sync_on_write)?;
            let entries = wal.replay()?;
            let replayed = entries.len();
            for entry in entries {
                store.replay(entry)?;
            }
            info!(path = %wal.path().display(), replayed, "recovered regions from WAL");
            store.wal = Some(Mutex::new(wal));
        }

        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self {
            regions: RwLock::new(HashMap::new()),
            declared: HashMap::new(),
            auto_create: true,
            codec: EntityCodec::default(),
            wal: None,
        }
    }

    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    /// Declares a region. An existing region keeps its records and gains
    /// any newly listed indexes. Returns `true` when the region was created.
    pub fn create_region(&self, config: RegionConfig) -> Result<bool> {
        validate_region_name(&config.name)?;
        if config.indexed_fields.iter().any(String::is_empty) {
            return Err(StoreError::validation("index field name must not be empty"));
        }

        if let Some(existing) = self.region(&config.name) {
            let mut state = existing.state().write();
            let RegionState {
                records, indexes, ..
            } = &mut *state;
            for field in &config.indexed_fields {
                indexes.declare(field, records.values().map(Arc::as_ref));
            }
            return Ok(false);
        }

        Ok(self.install(&config))
    }

    /// Removes a region with all its records and indexes. A region declared
    /// in the store config comes back empty, with its declared indexes.
    pub fn drop_region(&self, name: &str) -> Result<bool> {
        let mut regions = self.regions.write();
        let Some(region) = regions.get(name).cloned() else {
            return Ok(false);
        };

        let state = region.state().write();
        self.log(&region, || WalEntry::DropRegion(name.to_string()))?;
        self.reset(&mut regions, name, state);
        debug!(region = name, "dropped region");
        Ok(true)
    }

    pub fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_region(&self, name: &str) -> bool {
        self.regions.read().contains_key(name)
    }

    /// Inserts or replaces the record stored under `key`.
    pub fn put(&self, region: &str, key: Identity, record: Record) -> Result<()> {
        validate_write(region, &key, &record)?;

        loop {
            let target = self.region_for_write(region)?;
            let mut state = target.state().write();
            if state.dropped {
                continue;
            }
            let old = state.records.get(&key).cloned();
            return self.write(&target, &mut state, key, old, record);
        }
    }

    /// Replaces the record under `key` with `update(current)`, all under one
    /// write lock. Nothing is written when the key is absent or `update`
    /// returns `None`. Returns the stored replacement.
    pub fn update_if(
        &self,
        region: &str,
        key: &Identity,
        update: impl Fn(&Record) -> Option<Record>,
    ) -> Result<Option<Record>> {
        validate_region_name(region)?;

        loop {
            let Some(target) = self.region(region) else {
                return Ok(None);
            };
            let mut state = target.state().write();
            if state.dropped {
                continue;
            }
            let Some(old) = state.records.get(key).cloned() else {
                return Ok(None);
            };
            let Some(new) = update(&old) else {
                return Ok(None);
            };
            validate_write(region, key, &new)?;
            self.write(&target, &mut state, key.clone(), Some(old), new.clone())?;
            return Ok(Some(new));
        }
    }

    /// Record stored under `key`; `None` for a missing key or region.
    pub fn get(&self, region: &str, key: &Identity) -> Option<Record> {
        let target = self.region(region)?;
        let state = target.state().read();
        state.get(key).map(|record| Record::clone(record))
    }

    pub fn contains_key(&self, region: &str, key: &Identity) -> bool {
        self.read(region, |state| state.get(key).is_some())
            .unwrap_or(false)
    }

    /// Removes the record under `key` and all of its index entries.
    /// Deleting an absent key is a no-op.
    pub fn delete(&self, region: &str, key: &Identity) -> Result<Option<Record>> {
        self.delete_if(region, key, |_| true)
    }

    /// Like [`delete`](Self::delete), but only when `predicate` holds for the
    /// stored record. The check and the removal happen under one write lock.
    pub fn delete_if(
        &self,
        region: &str,
        key: &Identity,
        predicate: impl Fn(&Record) -> bool,
    ) -> Result<Option<Record>> {
        validate_region_name(region)?;

        loop {
            let target = self.region_for_write(region)?;
            let mut state = target.state().write();
            if state.dropped {
                continue;
            }

            let Some(old) = state.records.get(key).cloned() else {
                return Ok(None);
            };
            if !predicate(&old) {
                return Ok(None);
            }

            state.indexes.check_delete(key, &old)?;
            self.log(&target, || WalEntry::Delete {
                region: region.to_string(),
                key: key.clone(),
            })?;
            state.indexes.apply_delete(key, &old);
            state.records.remove(key);
            return Ok(Some(Arc::try_unwrap(old).unwrap_or_else(|shared| Record::clone(&shared))));
        }
    }

    /// Snapshot of the region taken now. Empty for an unknown region.
    pub fn scan(&self, region: &str) -> RegionScan {
        self.read(region, |state| RegionScan::new(state.snapshot()))
            .unwrap_or_else(RegionScan::empty)
    }

    pub fn len(&self, region: &str) -> usize {
        self.read(region, RegionState::len).unwrap_or(0)
    }

    /// Declares an index on `field`, building it from the current records.
    /// Returns `false` when it already existed.
    pub fn declare_index(&self, region: &str, field: &str) -> Result<bool> {
        validate_region_name(region)?;
        if field.is_empty() {
            return Err(StoreError::validation("index field name must not be empty"));
        }

        loop {
            let target = self.region_for_write(region)?;
            let mut state = target.state().write();
            if state.dropped {
                continue;
            }
            let RegionState {
                records, indexes, ..
            } = &mut *state;
            return Ok(indexes.declare(field, records.values().map(Arc::as_ref)));
        }
    }

    pub fn drop_index(&self, region: &str, field: &str) -> bool {
        let Some(target) = self.region(region) else {
            return false;
        };
        let dropped = target.state().write().indexes.drop_index(field);
        dropped
    }

    pub fn indexed_fields(&self, region: &str) -> Vec<String> {
        self.read(region, |state| {
            state.indexes().fields().map(str::to_string).collect()
        })
        .unwrap_or_default()
    }

    /// Keys whose indexed `field` equals `value`. Empty when nothing matches
    /// or no index is declared.
    pub fn lookup(&self, region: &str, field: &str, value: &FieldValue) -> HashSet<Identity> {
        self.read(region, |state| state.indexes().lookup(field, value))
            .flatten()
            .unwrap_or_default()
    }

    /// Full check of every index of `region` against its records.
    pub fn verify_indexes(&self, region: &str) -> Result<()> {
        let target = self
            .region(region)
            .ok_or_else(|| StoreError::RegionNotFound(region.to_string()))?;
        let state = target.state().read();
        state.indexes().verify(state.records())
    }

    /// Runs `f` under the region's read lock.
    pub fn read<R>(&self, region: &str, f: impl FnOnce(&RegionState) -> R) -> Option<R> {
        let target = self.region(region)?;
        let state = target.state().read();
        Some(f(&state))
    }

    /// Rewrites the log so it holds only live records.
    pub fn compact_log(&self) -> Result<usize> {
        let Some(wal) = &self.wal else {
            return Ok(0);
        };

        // The map guard stays held so no region can be created mid-compaction.
        let map = self.regions.read();
        let mut regions: Vec<&Arc<Region>> = map.values().collect();
        regions.sort_by(|a, b| a.name().cmp(b.name()));
        let guards: Vec<_> = regions.iter().map(|region| region.state().read()).collect();
        let live: Vec<&Record> = guards.iter().flat_map(|state| state.records()).collect();

        let written = wal.lock().compact(live)?;
        info!(records = written, "compacted WAL");
        Ok(written)
    }

    pub fn sync(&self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().sync()?;
        }
        Ok(())
    }

    fn region(&self, name: &str) -> Option<Arc<Region>> {
        self.regions.read().get(name).cloned()
    }

    fn region_for_write(&self, name: &str) -> Result<Arc<Region>> {
        if let Some(region) = self.region(name) {
            return Ok(region);
        }
        if !self.auto_create {
            return Err(StoreError::RegionNotFound(name.to_string()));
        }
        Ok(self.get_or_create(name))
    }

    fn get_or_create(&self, name: &str) -> Arc<Region> {
        let mut regions = self.regions.write();
        Arc::clone(regions.entry(name.to_string()).or_insert_with(|| {
            debug!(region = name, "created region on first write");
            Arc::new(Region::new(name, self.codec, None))
        }))
    }

    fn install(&self, config: &RegionConfig) -> bool {
        let mut regions = self.regions.write();
        if regions.contains_key(&config.name) {
            return false;
        }
        regions.insert(config.name.clone(), Arc::new(self.build(config)));
        true
    }

    fn build(&self, config: &RegionConfig) -> Region {
        let codec = EntityCodec::new(
            config.serializer.unwrap_or(self.codec.serializer()),
            self.codec.compression(),
        );
        let region = Region::new(&config.name, codec, config.record_type.clone());
        {
            let mut state = region.state().write();
            for field in &config.indexed_fields {
                state.indexes.declare(field, std::iter::empty());
            }
        }
        debug!(
            region = %config.name,
            indexes = ?config.indexed_fields,
            "declared region"
        );
        region
    }

    /// Empties a locked region and unlinks it, reinstalling its declaration
    /// when the config has one.
    fn reset(
        &self,
        regions: &mut HashMap<String, Arc<Region>>,
        name: &str,
        mut state: RwLockWriteGuard<'_, RegionState>,
    ) {
        state.dropped = true;
        state.records.clear();
        state.indexes.clear();
        drop(state);

        match self.declared.get(name) {
            Some(config) => {
                regions.insert(name.to_string(), Arc::new(self.build(config)));
            }
            None => {
                regions.remove(name);
            }
        }
    }

    fn replay(&self, entry: WalEntry) -> Result<()> {
        match entry {
            WalEntry::Put(record) => {
                let target = self.get_or_create(record.region());
                let mut state = target.state().write();
                let key = record.key().clone();
                let old = state.records.get(&key).cloned();
                state.indexes.on_put(&key, old.as_deref(), &record)?;
                state.records.insert(key, Arc::new(record));
            }
            WalEntry::Delete { region, key } => {
                let Some(target) = self.region(&region) else {
                    warn!(region = %region, key = %key, "WAL delete for unknown region");
                    return Ok(());
                };
                let mut state = target.state().write();
                if let Some(old) = state.records.remove(&key) {
                    state.indexes.on_delete(&key, &old)?;
                }
            }
            WalEntry::DropRegion(name) => {
                let mut regions = self.regions.write();
                if let Some(region) = regions.get(&name).cloned() {
                    self.reset(&mut regions, &name, region.state().write());
                }
            }
        }
        Ok(())
    }

    /// Type checks, index check, log append, then the swap. Any failure
    /// leaves the region untouched.
    fn write(
        &self,
        target: &Region,
        state: &mut RegionState,
        key: Identity,
        old: Option<Arc<Record>>,
        record: Record,
    ) -> Result<()> {
        if let Some(expected) = state.record_type() {
            if record.type_name() != expected {
                return Err(StoreError::validation(format!(
                    "region {} holds {} records, got {}",
                    target.name(),
                    expected,
                    record.type_name()
                )));
            }
        }
        if let Some(old) = &old {
            if old.type_name() != record.type_name() {
                return Err(StoreError::validation(format!(
                    "key {} in {} already holds a {} record, got {}",
                    key,
                    target.name(),
                    old.type_name(),
                    record.type_name()
                )));
            }
        }

        state.indexes.check_put(&key, old.as_deref(), &record)?;
        self.log(target, || WalEntry::Put(record.clone()))?;
        state.indexes.apply_put(&key, old.as_deref(), &record);
        state.records.insert(key, Arc::new(record));
        Ok(())
    }

    fn log(&self, region: &Region, entry: impl FnOnce() -> WalEntry) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().append_with(region.codec(), &entry())?;
        }
        Ok(())
    }
}

fn validate_write(region: &str, key: &Identity, record: &Record) -> Result<()> {
    validate_region_name(region)?;
    if key.is_null() {
        return Err(StoreError::validation(format!(
            "null key for region {}",
            region
        )));
    }
    if record.key() != key {
        return Err(StoreError::validation(format!(
            "record key {} does not match key {}",
            record.key(),
            key
        )));
    }
    if record.region() != region {
        return Err(StoreError::validation(format!(
            "record tagged for region {} written to {}",
            record.region(),
            region
        )));
    }
    Ok(())
}

fn validate_region_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::validation("region name must not be empty"));
    }
    Ok(())
}
