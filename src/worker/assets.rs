//! Static asset strategy: cache first, short network wait, typed placeholder.

use tracing::{debug, warn};

use super::fallback;
use super::refresh::spawn_refresh;
use super::ServiceWorker;
use crate::cache::{CacheStore, RequestKey, Served};
use crate::net::{fetch_with_timeout, Network, RequestInfo};

impl<S: CacheStore + 'static, N: Network> ServiceWorker<S, N> {
  pub(super) async fn handle_static(&self, request: &RequestInfo) -> Served {
    let key = RequestKey::of(request);

    if let Some(cached) = self.cache.lookup(&key) {
      if let Ok(partition) = self.cache.static_partition() {
        spawn_refresh(
          self.cache.clone(),
          self.network.clone(),
          partition,
          request.clone(),
          self.settings.timeouts.static_assets(),
        );
      }
      return Served::from_cache(cached);
    }

    match fetch_with_timeout(
      self.network.as_ref(),
      request,
      self.settings.timeouts.static_assets(),
    )
    .await
    {
      Ok(snapshot) if snapshot.is_success() => {
        let stored = self
          .cache
          .static_partition()
          .and_then(|partition| self.cache.store(&partition, &key, &snapshot));
        if let Err(e) = stored {
          warn!(url = %request.url, error = %e, "Failed to cache static asset");
        }
        Served::from_network(snapshot)
      }
      Ok(snapshot) => {
        debug!(url = %request.url, status = snapshot.status, "Static asset unavailable");
        Served::synthetic(fallback::for_asset(&request.url))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Failed to load static asset");
        Served::synthetic(fallback::for_asset(&request.url))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::worker;
  use crate::cache::ResponseSource;
  use crate::net::RequestInfo;
  use std::time::Duration;
  use url::Url;

  fn get(url: &str) -> RequestInfo {
    RequestInfo::get(Url::parse(url).unwrap())
  }

  #[tokio::test]
  async fn test_stylesheet_fallback_on_network_error() {
    let (worker, network) = worker().await;
    network.fail("https://a.example/styles/app.css", "network error: connection reset");

    let served = worker
      .handle_fetch(&get("https://a.example/styles/app.css"))
      .await
      .unwrap();

    assert_eq!(served.source, ResponseSource::Synthetic);
    assert!(served
      .snapshot
      .content_type()
      .unwrap()
      .starts_with("text/css"));
    assert!(served.snapshot.body_text().contains(".error-fallback"));
  }

  #[tokio::test]
  async fn test_fallback_content_type_matches_category() {
    let (worker, _network) = worker().await;
    let cases = [
      ("https://a.example/js/app.js", "application/javascript"),
      ("https://a.example/img/photo.jpg", "image/svg+xml"),
      ("https://a.example/css/login.css", "text/css"),
    ];

    for (url, expected) in cases {
      let served = worker.handle_fetch(&get(url)).await.unwrap();
      let content_type = served.snapshot.content_type().unwrap();
      assert!(content_type.starts_with(expected), "{} -> {}", url, content_type);
    }
  }

  #[tokio::test]
  async fn test_unknown_asset_type_gets_404() {
    let (worker, _network) = worker().await;
    let served = worker
      .handle_fetch(&get("https://a.example/fonts/x.woff2"))
      .await
      .unwrap();
    assert_eq!(served.snapshot.status, 404);
  }

  #[tokio::test(start_paused = true)]
  async fn test_static_miss_waits_three_seconds_at_most() {
    let (worker, network) = worker().await;
    network.hang("https://a.example/js/app.js");

    let started = tokio::time::Instant::now();
    let served = worker
      .handle_fetch(&get("https://a.example/js/app.js"))
      .await
      .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(served.source, ResponseSource::Synthetic);
  }

  #[tokio::test]
  async fn test_successful_asset_is_cached_in_static_partition() {
    let (worker, network) = worker().await;
    network.ok("https://a.example/css/styles.css", "text/css", "body{}");

    worker
      .handle_fetch(&get("https://a.example/css/styles.css"))
      .await
      .unwrap();
    network.fail("https://a.example/css/styles.css", "network error");

    let served = worker
      .handle_fetch(&get("https://a.example/css/styles.css"))
      .await
      .unwrap();
    match served.source {
      ResponseSource::Cache { partition, .. } => assert_eq!(partition, "static-v2.1"),
      other => panic!("expected cache hit, got {:?}", other),
    }
    assert_eq!(served.snapshot.body_text(), "body{}");
  }
}
