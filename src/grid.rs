//! The owning facade: regions, caches and sessions behind one handle.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::cache::CacheManager;
use crate::clock::{system_clock, SharedClock};
use crate::config::{RegionConfig, StoreConfig};
use crate::error::{Result, StoreError};
use crate::query::{Query, QueryEngine, QueryPlan};
use crate::region::{RegionScan, RegionStore};
use crate::repository::{Entity, Repository};
use crate::session::SessionStore;
use crate::sweeper::Sweeper;
use crate::types::{FieldValue, Identity, Record};

pub struct Grid {
    config: StoreConfig,
    store: Arc<RegionStore>,
    caches: Arc<CacheManager>,
    sessions: Arc<SessionStore>,
    sweepers: Mutex<Vec<Sweeper>>,
    closed: AtomicBool,
}

impl Grid {
    /// Opens the region store (replaying its log in durable mode) and
    /// starts the cache and session sweepers on the current runtime.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_clock(config, system_clock()).await
    }

    #[instrument(skip_all)]
    pub async fn open_with_clock(config: StoreConfig, clock: SharedClock) -> Result<Self> {
        let store = Arc::new(RegionStore::open(&config)?);
        let caches = Arc::new(CacheManager::new(config.cache.clone(), Arc::clone(&clock)));
        let sessions = Arc::new(SessionStore::new(
            Arc::clone(&store),
            &config.session,
            config.codec_for(&config.session.region_name),
            clock,
        )?);

        let cache_sweeper = {
            let caches = Arc::clone(&caches);
            Sweeper::spawn("cache", config.cache.sweep_interval(), move || {
                caches.purge_expired()
            })
        };
        let session_sweeper = {
            let sessions = Arc::clone(&sessions);
            Sweeper::spawn("session", config.session.sweep_interval(), move || {
                sessions.purge_expired()
            })
        };

        info!(regions = store.region_names().len(), "grid opened");
        Ok(Self {
            config,
            store,
            caches,
            sessions,
            sweepers: Mutex::new(vec![cache_sweeper, session_sweeper]),
            closed: AtomicBool::new(false),
        })
    }

    /// Stops the sweepers and flushes the log. Later calls fail with
    /// [`StoreError::Closed`]; closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sweepers: Vec<Sweeper> = self.sweepers.lock().drain(..).collect();
        for sweeper in sweepers {
            sweeper.shutdown().await;
        }
        self.store.sync()?;
        info!("grid closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn put(&self, region: &str, key: impl Into<Identity>, record: Record) -> Result<()> {
        self.ensure_open()?;
        self.store.put(region, key.into(), record)
    }

    pub fn get(&self, region: &str, key: &Identity) -> Result<Option<Record>> {
        self.ensure_open()?;
        Ok(self.store.get(region, key))
    }

    pub fn delete(&self, region: &str, key: &Identity) -> Result<Option<Record>> {
        self.ensure_open()?;
        self.store.delete(region, key)
    }

    pub fn scan(&self, region: &str) -> Result<RegionScan> {
        self.ensure_open()?;
        Ok(self.store.scan(region))
    }

    pub fn find_by_field(&self, region: &str, field: &str, value: &FieldValue) -> Result<Vec<Record>> {
        self.ensure_open()?;
        Ok(QueryEngine::new(&self.store).find_by_field(region, field, value))
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Record>> {
        self.ensure_open()?;
        Ok(QueryEngine::new(&self.store).run(query))
    }

    pub fn explain(&self, query: &Query) -> Result<QueryPlan> {
        self.ensure_open()?;
        Ok(QueryEngine::new(&self.store).explain(query))
    }

    pub fn declare_index(&self, region: &str, field: &str) -> Result<bool> {
        self.ensure_open()?;
        self.store.declare_index(region, field)
    }

    pub fn create_region(&self, config: RegionConfig) -> Result<bool> {
        self.ensure_open()?;
        self.store.create_region(config)
    }

    pub fn drop_region(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        self.store.drop_region(name)
    }

    /// Memoized lookup through the cache called `cache_name`. The configured
    /// compute timeout, if any, applies.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        cache_name: &str,
        key: impl Into<Identity>,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<Record>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Record, E>>,
        E: fmt::Display,
    {
        let timeout = self.config.cache.compute_timeout();
        self.get_or_compute_with_timeout(cache_name, key, compute, ttl, timeout)
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute) with a caller-chosen
    /// timeout. `None` waits for the computation however long it takes.
    pub async fn get_or_compute_with_timeout<F, Fut, E>(
        &self,
        cache_name: &str,
        key: impl Into<Identity>,
        compute: F,
        ttl: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<Record>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Record, E>>,
        E: fmt::Display,
    {
        self.ensure_open()?;
        let cache = self.caches.cache(cache_name);
        cache.get_or_compute(key.into(), compute, ttl, timeout).await
    }

    pub fn repository<E: Entity>(&self) -> Repository<'_, E> {
        Repository::new(self)
    }

    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    pub fn sessions(&self) -> Result<&SessionStore> {
        self.ensure_open()?;
        Ok(&self.sessions)
    }

    /// Rewrites the durable log down to the live records.
    pub fn compact(&self) -> Result<usize> {
        self.ensure_open()?;
        self.store.compact_log()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Persistence;
    use std::convert::Infallible;

    #[tokio::test]
    async fn closed_grid_rejects_operations() {
        let grid = Grid::open(StoreConfig::in_memory()).await.unwrap();
        grid.put("Order", 1, Record::new("Order", "Order", 1)).unwrap();

        grid.close().await.unwrap();
        grid.close().await.unwrap();
        assert!(grid.is_closed());
        assert!(matches!(grid.get("Order", &Identity::Int(1)), Err(StoreError::Closed)));
        assert!(matches!(
            grid.put("Order", 2, Record::new("Order", "Order", 2)),
            Err(StoreError::Closed)
        ));
        assert!(matches!(grid.sessions(), Err(StoreError::Closed)));

        let computed = grid
            .get_or_compute("Order", 1, || async { Ok::<_, Infallible>(Record::new("Order", "Order", 1)) }, None)
            .await;
        assert!(matches!(computed, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn durable_grid_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::durable(dir.path())
            .with_region(RegionConfig::new("Order").indexed("status"));

        let session_id = {
            let grid = Grid::open(config.clone()).await.unwrap();
            grid.put("Order", 1, Record::new("Order", "Order", 1).with_field("status", "open"))
                .unwrap();
            let session = grid.sessions().unwrap().create().unwrap();
            grid.close().await.unwrap();
            session.id().to_string()
        };

        let grid = Grid::open(config).await.unwrap();
        assert!(matches!(grid.config().persistence, Persistence::Durable { .. }));
        let open = grid
            .find_by_field("Order", "status", &FieldValue::from("open"))
            .unwrap();
        assert_eq!(open.len(), 1);
        assert!(grid.sessions().unwrap().get(&session_id).unwrap().is_some());
        grid.close().await.unwrap();
    }

    #[tokio::test]
    async fn named_caches_memoize_records() {
        let grid = Grid::open(StoreConfig::in_memory()).await.unwrap();
        let order = Record::new("Order", "Order", 1).with_field("status", "open");
        let expected = &order;

        let first = grid
            .get_or_compute("Order", 1, move || async move { Ok::<_, Infallible>(expected.clone()) }, None)
            .await
            .unwrap();
        let second = grid
            .get_or_compute("Order", 1, || async { Err::<Record, _>("not called") }, None)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(grid.caches().cache("Order").stats().computations, 1);
        grid.close().await.unwrap();
    }

    #[tokio::test]
    async fn per_call_timeout_overrides_config() {
        let mut config = StoreConfig::in_memory();
        config.cache.compute_timeout_ms = None;
        let grid = Grid::open(config).await.unwrap();
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Infallible>(Record::new("Order", "Order", 1))
        };

        let err = grid
            .get_or_compute_with_timeout("Order", 1, slow, None, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let record = grid
            .get_or_compute_with_timeout(
                "Order",
                1,
                || async { Ok::<_, Infallible>(Record::new("Order", "Order", 1)) },
                None,
                Some(Duration::from_millis(20)),
            )
            .await
            .unwrap();
        assert_eq!(record.key(), &Identity::Int(1));
        grid.close().await.unwrap();
    }
}
