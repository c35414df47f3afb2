//! Partition management: naming, install-time population and eviction.

use color_eyre::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::CacheStore;
use super::traits::{CachedSnapshot, Partition, PartitionInfo, Purpose, RequestKey, Snapshot};
use crate::config::Config;
use crate::net::{Network, RequestInfo};

/// The partitions that belong to the current worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSet {
  pub shell: String,
  pub static_assets: String,
  pub dynamic: String,
}

impl PartitionSet {
  pub fn from_config(config: &Config) -> Self {
    Self {
      shell: config.shell_partition(),
      static_assets: config.static_partition(),
      dynamic: config.dynamic_partition(),
    }
  }

  /// Allow-list used by activation.
  pub fn names(&self) -> BTreeSet<String> {
    [&self.shell, &self.static_assets, &self.dynamic]
      .into_iter()
      .cloned()
      .collect()
  }
}

/// Outcome of pre-populating the static partition.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<(String, String)>,
}

/// Owns the store and knows which partitions are current.
pub struct CacheManager<S: CacheStore> {
  store: Arc<S>,
  partitions: PartitionSet,
}

impl<S: CacheStore> CacheManager<S> {
  pub fn new(store: S, partitions: PartitionSet) -> Self {
    Self {
      store: Arc::new(store),
      partitions,
    }
  }

  pub fn partition_set(&self) -> &PartitionSet {
    &self.partitions
  }

  /// Open (creating on first use) a partition by name.
  pub fn open_partition(&self, name: &str, purpose: Purpose) -> Result<Partition> {
    self.store.open_partition(name, purpose)
  }

  pub fn static_partition(&self) -> Result<Partition> {
    self.open_partition(&self.partitions.static_assets, Purpose::Static)
  }

  pub fn dynamic_partition(&self) -> Result<Partition> {
    self.open_partition(&self.partitions.dynamic, Purpose::Dynamic)
  }

  pub fn shell_partition(&self) -> Result<Partition> {
    self.open_partition(&self.partitions.shell, Purpose::Shell)
  }

  /// Where a background refresh of a hit found in `name` should land, so the
  /// refreshed copy replaces the one lookups actually return.
  pub fn refresh_target(&self, name: &str) -> Result<Partition> {
    if name == self.partitions.static_assets {
      self.static_partition()
    } else if name == self.partitions.shell {
      self.shell_partition()
    } else {
      self.dynamic_partition()
    }
  }

  /// Store a snapshot if it is eligible. Returns whether anything was written.
  pub fn store(
    &self,
    partition: &Partition,
    key: &RequestKey,
    snapshot: &Snapshot,
  ) -> Result<bool> {
    if !snapshot.is_success() {
      debug!(url = %key.url, status = snapshot.status, "Not caching unsuccessful response");
      return Ok(false);
    }
    self.store.put(partition, key, snapshot)?;
    Ok(true)
  }

  /// Look a request up across all partitions. Storage errors count as a miss.
  pub fn lookup(&self, key: &RequestKey) -> Option<CachedSnapshot> {
    match self.store.match_any(key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(url = %key.url, error = %e, "Cache lookup failed, treating as miss");
        None
      }
    }
  }

  pub fn partitions(&self) -> Result<Vec<PartitionInfo>> {
    self.store.partitions()
  }

  /// Fetch every file bypassing intermediate caches and store the successes
  /// in the static partition. Individual failures are logged and skipped.
  pub async fn install_essential<N: Network>(
    &self,
    network: &N,
    origin: &Url,
    files: &[String],
  ) -> InstallReport {
    let mut report = InstallReport::default();

    let partition = match self.static_partition() {
      Ok(p) => p,
      Err(e) => {
        warn!(error = %e, "Could not open static partition; skipping install population");
        report
          .failed
          .extend(files.iter().map(|f| (f.clone(), e.to_string())));
        return report;
      }
    };

    for file in files {
      match self.install_one(network, origin, &partition, file).await {
        Ok(()) => report.cached.push(file.clone()),
        Err(e) => {
          warn!(file = %file, error = %e, "Failed to cache install file");
          report.failed.push((file.clone(), e.to_string()));
        }
      }
    }

    info!(
      partition = %partition.name,
      cached = report.cached.len(),
      failed = report.failed.len(),
      "Install population finished"
    );
    report
  }

  async fn install_one<N: Network>(
    &self,
    network: &N,
    origin: &Url,
    partition: &Partition,
    file: &str,
  ) -> Result<()> {
    let url = origin.join(file)?;
    let request = RequestInfo::get(url).bypass_cache();
    let snapshot = network.fetch(&request).await?;

    if !snapshot.is_success() {
      return Err(color_eyre::eyre::eyre!("HTTP {}", snapshot.status));
    }
    self.store(partition, &RequestKey::of(&request), &snapshot)?;
    Ok(())
  }

  /// Delete every partition whose name is not in `current`.
  pub fn purge_stale(&self, current: &BTreeSet<String>) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for partition in self.store.partitions()? {
      if current.contains(&partition.name) {
        continue;
      }
      info!(partition = %partition.name, "Deleting stale partition");
      if self.store.delete_partition(&partition.name)? {
        removed.push(partition.name);
      }
    }
    Ok(removed)
  }

  /// Delete every partition, current ones included.
  pub fn purge_all(&self) -> Result<Vec<String>> {
    self.purge_stale(&BTreeSet::new())
  }
}

impl<S: CacheStore> Clone for CacheManager<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      partitions: self.partitions.clone(),
    }
  }
}
