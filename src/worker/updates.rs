//! Development-mode update detection.
//!
//! Polls the worker script on a fixed interval. When its digest changes every
//! partition is purged and all open pages are told to reload.

use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use super::clients::ClientRegistry;
use crate::cache::{CacheManager, CacheStore};
use crate::net::{fetch_with_timeout, Network, RequestInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
  /// First digest recorded; nothing to compare against yet
  Baseline,
  Unchanged,
  Changed { purged: Vec<String>, notified: usize },
}

pub struct UpdateWatcher {
  script_url: Url,
  interval: Duration,
  timeout: Duration,
  last_digest: Option<String>,
}

impl UpdateWatcher {
  pub fn new(script_url: Url, interval: Duration, timeout: Duration) -> Self {
    Self {
      script_url,
      interval,
      timeout,
      last_digest: None,
    }
  }

  pub fn script_url(&self) -> &Url {
    &self.script_url
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  /// Fetch the script once and compare with the previous digest.
  pub async fn check_once<S: CacheStore, N: Network>(
    &mut self,
    network: &N,
    cache: &CacheManager<S>,
    clients: &ClientRegistry,
  ) -> Result<UpdateCheck> {
    let request = RequestInfo::get(self.script_url.clone()).bypass_cache();
    let snapshot = fetch_with_timeout(network, &request, self.timeout).await?;
    if !snapshot.is_success() {
      return Err(eyre!(
        "Worker script {} answered {}",
        self.script_url,
        snapshot.status
      ));
    }

    let digest = hex::encode(Sha256::digest(&snapshot.body));
    let previous = self.last_digest.replace(digest.clone());

    match previous {
      None => Ok(UpdateCheck::Baseline),
      Some(prev) if prev == digest => Ok(UpdateCheck::Unchanged),
      Some(_) => {
        info!(script = %self.script_url, "Worker script changed; purging caches");
        let purged = cache.purge_all()?;
        let notified = clients.broadcast_refresh();
        Ok(UpdateCheck::Changed { purged, notified })
      }
    }
  }

  /// Poll forever on the configured interval. Abort the handle to stop.
  pub fn spawn<S, N>(
    mut self,
    network: Arc<N>,
    cache: CacheManager<S>,
    clients: ClientRegistry,
  ) -> JoinHandle<()>
  where
    S: CacheStore + 'static,
    N: Network,
  {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      loop {
        ticker.tick().await;
        if let Err(e) = self.check_once(network.as_ref(), &cache, &clients).await {
          warn!(error = %e, "Update check failed");
        }
      }
    })
  }
}
