//! Network-first strategy for APIs and other dynamic requests.

use tracing::debug;

use super::fallback;
use super::router::{is_api_path, is_cacheable_method};
use super::ServiceWorker;
use crate::cache::{CacheStore, RequestKey, Served};
use crate::net::{fetch_with_timeout, Network, RequestInfo};

impl<S: CacheStore + 'static, N: Network> ServiceWorker<S, N> {
  pub(super) async fn handle_other(&self, request: &RequestInfo) -> Served {
    let key = RequestKey::of(request);

    match fetch_with_timeout(
      self.network.as_ref(),
      request,
      self.settings.timeouts.dynamic(),
    )
    .await
    {
      Ok(snapshot) if snapshot.is_success() => {
        if is_cacheable_method(&request.method) && snapshot.status == 200 {
          // Best effort; a failed write never affects the response
          if let Err(e) = self
            .cache
            .dynamic_partition()
            .and_then(|partition| self.cache.store(&partition, &key, &snapshot))
          {
            debug!(url = %request.url, error = %e, "Failed to cache dynamic response");
          }
        }
        return Served::from_network(snapshot);
      }
      Ok(snapshot) => {
        debug!(url = %request.url, status = snapshot.status, "Request answered with error status");
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Request failed");
      }
    }

    if is_cacheable_method(&request.method) {
      if let Some(cached) = self.cache.lookup(&key) {
        return Served::from_cache(cached);
      }
    }

    if is_api_path(&request.url) {
      Served::synthetic(fallback::api_unavailable())
    } else {
      Served::synthetic(fallback::service_unavailable())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::worker;
  use crate::cache::{ResponseSource, Snapshot};
  use crate::net::RequestInfo;
  use reqwest::Method;
  use url::Url;

  fn get(url: &str) -> RequestInfo {
    RequestInfo::get(Url::parse(url).unwrap())
  }

  #[tokio::test]
  async fn test_get_falls_back_to_cache() {
    let (worker, network) = worker().await;
    network.ok("https://a.example/api/messages", "application/json", "[1,2]");
    let first = worker
      .handle_fetch(&get("https://a.example/api/messages"))
      .await
      .unwrap();
    assert_eq!(first.source, ResponseSource::Network);

    network.fail("https://a.example/api/messages", "network error");
    let second = worker
      .handle_fetch(&get("https://a.example/api/messages"))
      .await
      .unwrap();
    assert!(matches!(second.source, ResponseSource::Cache { .. }));
    assert_eq!(second.snapshot.body_text(), "[1,2]");
  }

  #[tokio::test]
  async fn test_post_never_reads_cache() {
    let (worker, network) = worker().await;
    network.ok("https://a.example/api/messages", "application/json", "[1,2]");
    worker
      .handle_fetch(&get("https://a.example/api/messages"))
      .await
      .unwrap();

    network.fail("https://a.example/api/messages", "network error");
    let post = get("https://a.example/api/messages").with_method(Method::POST);
    let served = worker.handle_fetch(&post).await.unwrap();

    assert_eq!(served.snapshot.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&served.snapshot.body).unwrap();
    assert_eq!(body["offline"], true);
  }

  #[tokio::test]
  async fn test_non_api_failure_is_plain_text() {
    let (worker, _network) = worker().await;
    let served = worker
      .handle_fetch(&get("https://a.example/feed"))
      .await
      .unwrap();
    assert_eq!(served.snapshot.status, 503);
    assert_eq!(served.snapshot.content_type(), Some("text/plain"));
  }

  #[tokio::test]
  async fn test_error_status_is_not_cached() {
    let (worker, network) = worker().await;
    network.respond(
      "https://a.example/api/x",
      Snapshot::text(500, "application/json", "{}"),
    );
    let served = worker
      .handle_fetch(&get("https://a.example/api/x"))
      .await
      .unwrap();
    assert_eq!(served.snapshot.status, 503);
    assert_eq!(served.source, ResponseSource::Synthetic);
  }
}
