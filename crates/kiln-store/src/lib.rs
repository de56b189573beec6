//! Local package store and package lookup for kiln.
//!
//! This crate provides the storage layer behind dependency planning: a
//! `StoreLayout` describing the on-disk directory structure, `PackageIndex`
//! for reading and writing package records atomically, the `PackageSource`
//! lookup capability that the dependency planner is given, an in-memory
//! `MemorySource` for tests and embedding, and `StoreLock` for serializing
//! writers.

pub mod index;
pub mod layout;
pub mod lock;
pub mod source;

pub use index::{PackageIndex, PackageRecord};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use source::{MemorySource, PackageSource};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("package record parse error: {0}")]
    RecordParse(#[from] toml::de::Error),
    #[error("package record serialize error: {0}")]
    RecordSerialize(#[from] toml::ser::Error),
    #[error("invalid package reference: {0}")]
    InvalidReference(String),
    #[error("integrity failure for '{name}': expected {expected}, got {actual}")]
    IntegrityFailure {
        name: String,
        expected: String,
        actual: String,
    },
}
