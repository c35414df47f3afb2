//! The caching worker: lifecycle, request routing and client messaging.
//!
//! A [`ServiceWorker`] sits between pages and the origin. Requests are
//! classified by [`router::classify`] and each kind maps to exactly one
//! strategy:
//!
//! - `Navigate` → cache first, background refresh, bounded wait, fallback chain
//! - `Static` → cache first, background refresh, typed placeholder
//! - `Other` → network first, cache fallback for GET, structured 503
//!
//! Every strategy resolves to a response; none of them return errors.

mod assets;
mod clients;
mod dynamic;
mod fallback;
mod messages;
mod navigation;
mod refresh;
pub mod router;
mod updates;

pub use clients::{ClientId, ClientNotice, ClientRegistry};
pub use messages::{ClientMessage, Notification, VersionReply};
pub use router::RequestKind;
pub use updates::{UpdateCheck, UpdateWatcher};

use color_eyre::eyre::Report;
use color_eyre::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheManager, CacheStore, InstallReport, Served};
use crate::config::{Config, TimeoutsConfig};
use crate::net::{Network, RequestInfo};

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Created, nothing installed yet
  Parsed,
  /// Installed and waiting for the previous version's pages to close
  Waiting,
  /// Controlling pages and answering fetches
  Active,
}

/// The subset of configuration the worker consults at runtime.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub version: String,
  pub origin: Url,
  pub essential_files: Vec<String>,
  pub optional_files: Vec<String>,
  pub timeouts: TimeoutsConfig,
  pub auto_skip_waiting: bool,
  pub dev_updates: Option<(String, Duration)>,
}

impl WorkerSettings {
  pub fn from_config(config: &Config) -> Self {
    Self {
      version: config.version.clone(),
      origin: config.origin.clone(),
      essential_files: config.essential_files.clone(),
      optional_files: config.optional_files.clone(),
      timeouts: config.timeouts.clone(),
      auto_skip_waiting: config.dev.auto_skip_waiting,
      dev_updates: config.dev.enabled.then(|| {
        (
          config.dev.script_path.clone(),
          Duration::from_secs(config.dev.poll_interval_secs.max(1)),
        )
      }),
    }
  }
}

pub struct ServiceWorker<S: CacheStore, N: Network> {
  cache: CacheManager<S>,
  network: Arc<N>,
  settings: WorkerSettings,
  lifecycle: Lifecycle,
  skip_waiting: bool,
  clients: ClientRegistry,
}

impl<S: CacheStore + 'static, N: Network> ServiceWorker<S, N> {
  pub fn new(cache: CacheManager<S>, network: Arc<N>, settings: WorkerSettings) -> Self {
    Self {
      skip_waiting: settings.auto_skip_waiting,
      cache,
      network,
      settings,
      lifecycle: Lifecycle::Parsed,
      clients: ClientRegistry::new(),
    }
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }

  pub fn version(&self) -> &str {
    &self.settings.version
  }

  pub fn cache(&self) -> &CacheManager<S> {
    &self.cache
  }

  pub fn clients(&self) -> &ClientRegistry {
    &self.clients
  }

  /// Resume a worker whose version was activated by an earlier run: every
  /// current partition already exists in the durable store.
  pub fn restore(&mut self) -> Result<bool> {
    let existing: BTreeSet<String> = self
      .cache
      .partitions()?
      .into_iter()
      .map(|p| p.name)
      .collect();
    let current = self.cache.partition_set().names();

    if current.is_subset(&existing) {
      self.lifecycle = Lifecycle::Active;
      info!(version = %self.settings.version, "Restored active worker");
      return Ok(true);
    }
    Ok(false)
  }

  /// Pre-populate the static partition. Unreachable files never fail the
  /// install. Activates straight away when skip-waiting is in effect.
  pub async fn install(&mut self) -> Result<InstallReport> {
    info!(version = %self.settings.version, "Installing worker");

    let mut report = self
      .cache
      .install_essential(
        self.network.as_ref(),
        &self.settings.origin,
        &self.settings.essential_files,
      )
      .await;
    let optional = self
      .cache
      .install_essential(
        self.network.as_ref(),
        &self.settings.origin,
        &self.settings.optional_files,
      )
      .await;
    report.cached.extend(optional.cached);
    report.failed.extend(optional.failed);

    self.lifecycle = Lifecycle::Waiting;
    if self.skip_waiting {
      self.activate()?;
    }
    Ok(report)
  }

  /// Purge every partition that is not current, then take control of all
  /// open pages. Returns the purged partition names.
  pub fn activate(&mut self) -> Result<Vec<String>> {
    info!(version = %self.settings.version, "Activating worker");

    let current = self.cache.partition_set().names();
    let purged = self.cache.purge_stale(&current)?;
    self.cache.shell_partition()?;
    self.cache.static_partition()?;
    self.cache.dynamic_partition()?;

    self.lifecycle = Lifecycle::Active;
    let claimed = self.clients.claim(&self.settings.version);
    info!(purged = purged.len(), claimed, "Worker active");
    Ok(purged)
  }

  /// A waiting worker activates once the last page of the old version closes.
  pub fn client_closed(&mut self, id: ClientId) -> Result<()> {
    self.clients.disconnect(id);
    if self.lifecycle == Lifecycle::Waiting && self.clients.is_empty() {
      self.activate()?;
    }
    Ok(())
  }

  /// Answer a fetch, or `None` to leave it to default network handling.
  pub async fn handle_fetch(&self, request: &RequestInfo) -> Option<Served> {
    if self.lifecycle != Lifecycle::Active {
      return None;
    }

    let kind = router::classify(request)?;
    let served = match kind {
      RequestKind::Navigate => self.handle_navigation(request).await,
      RequestKind::Static => self.handle_static(request).await,
      RequestKind::Other => self.handle_other(request).await,
    };
    Some(served)
  }

  /// Handle a control message. Unknown messages are ignored.
  pub fn handle_message(&mut self, raw: &str) -> Result<Option<VersionReply>> {
    info!(payload = raw, "Client message received");

    match ClientMessage::parse(raw) {
      Some(ClientMessage::SkipWaiting) => {
        self.skip_waiting = true;
        if self.lifecycle == Lifecycle::Waiting {
          self.activate()?;
        }
        Ok(None)
      }
      Some(ClientMessage::GetVersion) => Ok(Some(VersionReply {
        version: self.settings.version.clone(),
      })),
      None => Ok(None),
    }
  }

  /// Turn a push payload into the notification to display.
  pub fn handle_push(&self, payload: Option<&[u8]>) -> Notification {
    let notification = Notification::from_payload(payload);
    info!(title = %notification.title, "Push received");
    notification
  }

  /// Log and suppress an uncaught worker error.
  pub fn report_error(&self, error: &Report) {
    error!(error = %error, "Uncaught worker error");
  }

  /// Log and suppress an unhandled rejection.
  pub fn report_rejection(&self, reason: &str) {
    warn!(reason, "Unhandled rejection in worker");
  }

  /// Watcher for development-mode update polling, when enabled.
  pub fn update_watcher(&self) -> Option<UpdateWatcher> {
    let (script_path, interval) = self.settings.dev_updates.clone()?;
    let script_url = self.settings.origin.join(&script_path).ok()?;
    Some(UpdateWatcher::new(
      script_url,
      interval,
      self.settings.timeouts.dynamic(),
    ))
  }

  pub fn network(&self) -> &Arc<N> {
    &self.network
  }
}


#[cfg(test)]
mod tests {
  use super::testing::settings;
  use super::*;
  use crate::cache::{PartitionSet, Purpose, SqliteStore};
  use crate::net::testing::FakeNetwork;

  fn waiting_worker() -> ServiceWorker<SqliteStore, FakeNetwork> {
    let (config, mut settings) = settings();
    settings.auto_skip_waiting = false;
    let cache = CacheManager::new(
      SqliteStore::open_in_memory().unwrap(),
      PartitionSet::from_config(&config),
    );
    ServiceWorker::new(cache, Arc::new(FakeNetwork::new()), settings)
  }

  #[tokio::test]
  async fn test_skip_waiting_message_activates_waiting_worker() {
    let mut worker = waiting_worker();
    let (page, mut rx) = worker
      .clients()
      .connect(Url::parse("https://a.example/").unwrap());

    worker.install().await.unwrap();
    assert_eq!(worker.lifecycle(), Lifecycle::Waiting);

    worker.handle_message(r#"{"type":"SKIP_WAITING"}"#).unwrap();
    assert_eq!(worker.lifecycle(), Lifecycle::Active);
    // The page never closed; it is now controlled by the new worker
    assert!(worker.clients().is_controlled(page));
    assert!(matches!(
      rx.try_recv().unwrap(),
      ClientNotice::Controlled { .. }
    ));
  }

  #[tokio::test]
  async fn test_waiting_worker_activates_when_last_client_closes() {
    let mut worker = waiting_worker();
    let (page, _rx) = worker
      .clients()
      .connect(Url::parse("https://a.example/").unwrap());
    worker.install().await.unwrap();

    worker.client_closed(page).unwrap();
    assert_eq!(worker.lifecycle(), Lifecycle::Active);
  }

  #[tokio::test]
  async fn test_waiting_worker_does_not_intercept() {
    let mut worker = waiting_worker();
    worker.install().await.unwrap();
    let request = RequestInfo::navigate(Url::parse("https://a.example/").unwrap());
    assert!(worker.handle_fetch(&request).await.is_none());
  }

  #[tokio::test]
  async fn test_activation_purges_previous_versions() {
    let mut worker = waiting_worker();
    worker
      .cache()
      .open_partition("static-v2.0", Purpose::Static)
      .unwrap();
    worker
      .cache()
      .open_partition("dynamic-v2.0", Purpose::Dynamic)
      .unwrap();

    worker.install().await.unwrap();
    let purged = worker.activate().unwrap();

    assert_eq!(purged.len(), 2);
    let names: BTreeSet<String> = worker
      .cache()
      .partitions()
      .unwrap()
      .into_iter()
      .map(|p| p.name)
      .collect();
    assert_eq!(names, worker.cache().partition_set().names());
  }

  #[test]
  fn test_get_version_reply() {
    let mut worker = waiting_worker();
    let reply = worker.handle_message(r#"{"type":"GET_VERSION"}"#).unwrap();
    assert_eq!(
      reply,
      Some(VersionReply {
        version: "2.1".to_string()
      })
    );
    assert_eq!(worker.handle_message(r#"{"type":"PING"}"#).unwrap(), None);
    assert_eq!(worker.lifecycle(), Lifecycle::Parsed);
  }

  #[tokio::test]
  async fn test_restore_requires_current_partitions() {
    let (worker, _network) = testing::worker().await;
    let store_partitions = worker.cache().clone();

    let (_config, settings) = settings();
    let mut resumed = ServiceWorker::new(store_partitions, Arc::new(FakeNetwork::new()), settings);
    assert!(resumed.restore().unwrap());
    assert_eq!(resumed.lifecycle(), Lifecycle::Active);

    let mut fresh = waiting_worker();
    assert!(!fresh.restore().unwrap());
  }

  #[tokio::test]
  async fn test_extension_requests_pass_through() {
    let (worker, network) = testing::worker().await;
    let request = RequestInfo::get(Url::parse("chrome-extension://abc/x.js").unwrap());
    assert!(worker.handle_fetch(&request).await.is_none());
    assert!(network.requests().iter().all(|(_, u)| !u.contains("extension")));
  }

  #[tokio::test]
  async fn test_reported_errors_are_suppressed() {
    let (worker, _network) = testing::worker().await;
    worker.report_error(&color_eyre::eyre::eyre!("boom"));
    worker.report_rejection("task panicked");

    assert_eq!(worker.lifecycle(), Lifecycle::Active);
    let request = RequestInfo::get(Url::parse("https://a.example/api/x").unwrap());
    assert!(worker.handle_fetch(&request).await.is_some());
  }

  #[test]
  fn test_update_watcher_only_in_dev_mode() {
    let worker = waiting_worker();
    assert!(worker.update_watcher().is_none());

    let (config, mut settings) = settings();
    settings.dev_updates = Some(("/sw.js".to_string(), Duration::from_secs(5)));
    let cache = CacheManager::new(
      SqliteStore::open_in_memory().unwrap(),
      PartitionSet::from_config(&config),
    );
    let worker = ServiceWorker::new(cache, Arc::new(FakeNetwork::new()), settings);
    assert!(worker.update_watcher().is_some());
  }
}
