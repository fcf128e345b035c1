//! Memoizing cache for derived or expensive lookups.
//!
//! Entries carry a time-to-live and live in a bounded LRU. Concurrent
//! misses on one key share a single computation; the first caller runs it
//! and the rest wait on the same slot.

pub mod entry;
pub mod manager;

#[cfg(test)]
mod tests;

pub use entry::{CacheEntry, CacheStats};
pub use manager::{Cache, CacheManager};
