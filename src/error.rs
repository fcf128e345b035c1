use thiserror::Error;

use crate::types::Identity;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Region not found: {0}")]
    RegionNotFound(String),

    /// Internal invariant violation. Never expected in correct operation.
    #[error("Index inconsistency in {region}.{field} for key {key}: {detail}")]
    IndexInconsistency {
        region: String,
        field: String,
        key: Identity,
        detail: String,
    },

    #[error("Cache computation for {key} timed out after {elapsed_ms} ms")]
    Timeout { key: Identity, elapsed_ms: u128 },

    #[error("Cache computation for {key} failed: {reason}")]
    Compute { key: Identity, reason: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Grid is closed")]
    Closed,
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Frame too short: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Bad frame magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported frame version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown {kind} tag {tag}")]
    UnknownTag { kind: &'static str, tag: u8 },

    #[error("Frame payload of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("Compression failure: {0}")]
    Compression(String),

    #[error("Serialization failure: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        CodecError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Serialization(err.to_string())
    }
}
