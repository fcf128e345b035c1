use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::codec::{Compression, EntityCodec, Serializer};
use crate::error::{Result, StoreError};

/// Environment variable naming a TOML config file for [`StoreConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "GRIDSTORE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub persistence: Persistence,
    /// Create unknown regions on first write instead of failing.
    pub auto_create_regions: bool,
    pub codec: CodecConfig,
    pub regions: Vec<RegionConfig>,
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Persistence {
    InMemory,
    /// Every mutation is appended to `<dir>/regions.wal` and replayed on open.
    Durable {
        dir: PathBuf,
        #[serde(default)]
        sync_on_write: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub serializer: Serializer,
    pub compression: Compression,
}

impl CodecConfig {
    pub fn codec(&self) -> EntityCodec {
        EntityCodec::new(self.serializer, self.compression)
    }
}

/// Declaration of one region, created when the store opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    #[serde(default)]
    pub indexed_fields: Vec<String>,
    /// Overrides the store-wide serializer for this region's log entries.
    #[serde(default)]
    pub serializer: Option<Serializer>,
    /// When set, only records of this type are accepted.
    #[serde(default)]
    pub record_type: Option<String>,
}

impl RegionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed_fields: Vec::new(),
            serializer: None,
            record_type: None,
        }
    }

    pub fn indexed(mut self, field: impl Into<String>) -> Self {
        self.indexed_fields.push(field.into());
        self
    }

    pub fn serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-cache entry limit; `None` leaves caches unbounded.
    pub capacity: Option<usize>,
    pub default_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Deadline applied to computations when the caller gives none.
    pub compute_timeout_ms: Option<u64>,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn compute_timeout(&self) -> Option<Duration> {
        self.compute_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub region_name: String,
    pub max_inactive_secs: u64,
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    pub fn max_inactive(&self) -> Duration {
        Duration::from_secs(self.max_inactive_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persistence: Persistence::InMemory,
            auto_create_regions: true,
            codec: CodecConfig::default(),
            regions: Vec::new(),
            cache: CacheConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for Persistence {
    fn default() -> Self {
        Persistence::InMemory
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Some(10_000),
            default_ttl_secs: 600,
            sweep_interval_secs: 30,
            compute_timeout_ms: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            region_name: "Sessions".to_string(),
            max_inactive_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self {
            persistence: Persistence::Durable {
                dir: dir.into(),
                sync_on_write: false,
            },
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: RegionConfig) -> Self {
        self.regions.push(region);
        self
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loading store config");
        Self::from_toml_str(&raw)
    }

    /// Loads the file named by `GRIDSTORE_CONFIG` (a `.env` file is honored),
    /// falling back to defaults when the variable is unset.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.name.is_empty() {
                return Err(StoreError::Config("region name must not be empty".into()));
            }
            if !seen.insert(region.name.as_str()) {
                return Err(StoreError::Config(format!(
                    "region {} declared twice",
                    region.name
                )));
            }
            if region.indexed_fields.iter().any(String::is_empty) {
                return Err(StoreError::Config(format!(
                    "region {} declares an index with an empty field name",
                    region.name
                )));
            }
        }
        if self.cache.capacity == Some(0) {
            return Err(StoreError::Config("cache capacity must be positive".into()));
        }
        if self.cache.sweep_interval_secs == 0 || self.session.sweep_interval_secs == 0 {
            return Err(StoreError::Config("sweep intervals must be positive".into()));
        }
        if self.session.region_name.is_empty() {
            return Err(StoreError::Config("session region name must not be empty".into()));
        }
        Ok(())
    }

    /// Codec used for a region's log entries.
    pub fn codec_for(&self, region: &str) -> EntityCodec {
        let serializer = self
            .regions
            .iter()
            .find(|r| r.name == region)
            .and_then(|r| r.serializer)
            .unwrap_or(self.codec.serializer);
        EntityCodec::new(serializer, self.codec.compression)
    }
}
