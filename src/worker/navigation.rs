//! Navigation strategy: cache first with background refresh, bounded network
//! wait on a miss, then a tiered fallback chain.

use tracing::{debug, warn};

use super::fallback::{self, HOME_PAGES};
use super::refresh::spawn_refresh;
use super::ServiceWorker;
use crate::cache::{CacheStore, RequestKey, Served};
use crate::net::{fetch_with_timeout, Network, RequestInfo};

impl<S: CacheStore + 'static, N: Network> ServiceWorker<S, N> {
  /// Always resolves to a response.
  pub(super) async fn handle_navigation(&self, request: &RequestInfo) -> Served {
    let key = RequestKey::of(request);

    if let Some(cached) = self.cache.lookup(&key) {
      match self.cache.refresh_target(&cached.partition) {
        Ok(partition) => {
          spawn_refresh(
            self.cache.clone(),
            self.network.clone(),
            partition,
            request.clone(),
            self.settings.timeouts.dynamic(),
          );
        }
        Err(e) => debug!(error = %e, "Skipping background refresh"),
      }
      return Served::from_cache(cached);
    }

    let fetch_request = request.clone().bypass_cache();
    match fetch_with_timeout(
      self.network.as_ref(),
      &fetch_request,
      self.settings.timeouts.navigation(),
    )
    .await
    {
      Ok(snapshot) if snapshot.is_success() => {
        let stored = self
          .cache
          .dynamic_partition()
          .and_then(|partition| self.cache.store(&partition, &key, &snapshot));
        if let Err(e) = stored {
          warn!(url = %request.url, error = %e, "Failed to cache navigation response");
        }
        return Served::from_network(snapshot);
      }
      Ok(snapshot) => {
        debug!(
          url = %request.url,
          status = snapshot.status,
          "Navigation answered with error status"
        );
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network error during navigation");
      }
    }

    self.navigation_fallback(request)
  }

  /// Route-specific cached page, then a generic cached home page, then the
  /// synthesized offline document.
  fn navigation_fallback(&self, request: &RequestInfo) -> Served {
    let specific = fallback::fallback_page_for(request.path());
    let candidates =
      std::iter::once(specific).chain(HOME_PAGES.iter().copied().filter(|p| *p != specific));

    for page in candidates {
      let Ok(url) = request.url.join(page) else {
        continue;
      };
      if let Some(cached) = self.cache.lookup(&RequestKey::new("GET", url.as_str())) {
        debug!(url = %request.url, fallback = page, "Serving cached fallback page");
        return Served::fallback_page(page, cached);
      }
    }

    Served::synthetic(fallback::offline_page())
  }
}
