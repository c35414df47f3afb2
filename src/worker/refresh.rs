//! Detached stale-while-revalidate refreshes.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheManager, CacheStore, Partition, RequestKey};
use crate::net::{fetch_with_timeout, Network, RequestInfo};

/// Re-fetch `request` and overwrite its entry in `partition` on success.
///
/// The task is detached: callers drop the handle and have already returned
/// their response. Any failure is logged at debug level and discarded.
pub fn spawn_refresh<S, N>(
  cache: CacheManager<S>,
  network: Arc<N>,
  partition: Partition,
  request: RequestInfo,
  limit: Duration,
) -> JoinHandle<()>
where
  S: CacheStore + 'static,
  N: Network,
{
  tokio::spawn(async move {
    if let Err(e) = refresh(&cache, network.as_ref(), &partition, &request, limit).await {
      debug!(url = %request.url, error = %e, "Background refresh failed");
    }
  })
}

async fn refresh<S: CacheStore, N: Network>(
  cache: &CacheManager<S>,
  network: &N,
  partition: &Partition,
  request: &RequestInfo,
  limit: Duration,
) -> Result<()> {
  let snapshot = fetch_with_timeout(network, request, limit).await?;
  if cache.store(partition, &RequestKey::of(request), &snapshot)? {
    debug!(url = %request.url, partition = %partition.name, "Refreshed cached response");
  }
  Ok(())
}
