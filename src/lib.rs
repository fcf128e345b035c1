//! In-memory region store with secondary indexes, a single-flight cache
//! and session storage, optionally backed by a write-ahead log.

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod grid;
pub mod index;
pub mod query;
pub mod region;
pub mod repository;
pub mod session;
pub mod sweeper;
pub mod types;

pub use cache::{Cache, CacheManager, CacheStats};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use codec::{Compression, EntityCodec, Serializer};
pub use config::{Persistence, RegionConfig, StoreConfig};
pub use error::{CodecError, Result, StoreError};
pub use grid::Grid;
pub use query::{Query, QueryEngine, QueryPlan};
pub use region::{RegionScan, RegionStore};
pub use repository::{Entity, Repository};
pub use session::{Session, SessionStore};
pub use types::{FieldValue, Identity, Record};
