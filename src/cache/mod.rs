//! Durable response cache organised in named, versioned partitions.
//!
//! This module provides:
//! - Request identity keys (method + URL, hashed)
//! - Immutable response snapshots, replaced wholesale on refresh
//! - Partition lifecycle: open on first use, purge everything not current
//! - Best-effort install-time population of the static partition

mod manager;
mod storage;
mod traits;

pub use manager::{CacheManager, InstallReport, PartitionSet};
pub use storage::{CacheStore, NoopStore, SqliteStore};
pub use traits::{Partition, PartitionInfo, RequestKey, Served, Snapshot};

#[cfg(test)]
pub use traits::{Purpose, ResponseSource};
