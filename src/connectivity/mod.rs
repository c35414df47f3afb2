//! Page-side connectivity checks, retries and error remediation.
//!
//! The engine probes reachability, retries operations with exponential
//! backoff and turns reported errors into user-facing remediation on a
//! [`Page`]: offline mode, origin switching, or a delayed reload.

mod classify;
mod page;
mod retry;

pub use classify::{ErrorClassifier, ErrorKind, HeuristicClassifier, TransportClassifier};
pub use page::{Notice, NoticeLevel, Page, PageAction, NOTICE_TTL};
pub use retry::Backoff;

#[cfg(test)]
pub use page::testing;

use color_eyre::eyre::{eyre, Report};
use color_eyre::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::net::{fetch_with_timeout, Network, RequestInfo, RequestMode};

const DOWNGRADE_DELAY: Duration = Duration::from_secs(3);
const SWITCH_ORIGIN_DELAY: Duration = Duration::from_secs(2);
const RECONNECTED_RELOAD_DELAY: Duration = Duration::from_secs(2);
const TIMEOUT_RELOAD_DELAY: Duration = Duration::from_secs(3);
const UNKNOWN_RELOAD_DELAY: Duration = Duration::from_secs(5);

/// Observable remediation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
  current_retry: u32,
  last_error: Option<String>,
  is_offline: bool,
  certificate_error: bool,
}

impl ConnectivityState {
  pub fn current_retry(&self) -> u32 {
    self.current_retry
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn is_offline(&self) -> bool {
    self.is_offline
  }

  pub fn certificate_error(&self) -> bool {
    self.certificate_error
  }

  fn record_failure(&mut self, attempt: u32, error: &Report) {
    self.current_retry = attempt;
    self.last_error = Some(format!("{:#}", error));
  }

  fn record_success(&mut self) {
    self.current_retry = 0;
  }

  /// Back to a clean slate after a successful re-check.
  fn reset(&mut self) {
    *self = Self::default();
  }
}

#[derive(Debug, Clone)]
pub struct ConnectivitySettings {
  pub probe_path: String,
  pub probe_timeout: Duration,
  pub cross_origin_probe: Option<Url>,
  pub fallback_origins: Vec<Url>,
  pub allow_insecure_downgrade: bool,
  pub backoff: Backoff,
}

impl ConnectivitySettings {
  pub fn from_config(config: &Config) -> Self {
    Self {
      probe_path: config.connectivity.probe_path.clone(),
      probe_timeout: config.timeouts.probe(),
      cross_origin_probe: config.connectivity.cross_origin_probe.clone(),
      fallback_origins: config.fallback_origins(),
      allow_insecure_downgrade: config.connectivity.allow_insecure_downgrade,
      backoff: Backoff::new(
        Duration::from_millis(config.retry.base_delay_ms),
        config.retry.max_attempts,
      ),
    }
  }
}

/// OR over the individual probe results.
pub fn any_probe_online(results: &[bool]) -> bool {
  results.iter().any(|online| *online)
}

pub struct ConnectivityEngine<N: Network, P: Page, C: ErrorClassifier = HeuristicClassifier> {
  network: Arc<N>,
  page: P,
  classifier: C,
  settings: ConnectivitySettings,
  state: Mutex<ConnectivityState>,
}

impl<N: Network, P: Page> ConnectivityEngine<N, P> {
  pub fn new(network: Arc<N>, page: P, settings: ConnectivitySettings) -> Self {
    Self::with_classifier(network, page, settings, HeuristicClassifier)
  }
}

impl<N: Network, P: Page, C: ErrorClassifier> ConnectivityEngine<N, P, C> {
  pub fn with_classifier(
    network: Arc<N>,
    page: P,
    settings: ConnectivitySettings,
    classifier: C,
  ) -> Self {
    Self {
      network,
      page,
      classifier,
      settings,
      state: Mutex::new(ConnectivityState::default()),
    }
  }

  fn lock_state(&self) -> MutexGuard<'_, ConnectivityState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Copy of the current state.
  pub fn state(&self) -> ConnectivityState {
    self.lock_state().clone()
  }

  pub fn page(&self) -> &P {
    &self.page
  }

  pub fn settings(&self) -> &ConnectivitySettings {
    &self.settings
  }

  /// Probe reachability three ways at once: the platform flag, a HEAD on a
  /// small same-origin resource, and an optional cross-origin request.
  pub async fn check_connectivity(&self) -> bool {
    let platform = self.network.is_online();
    let (local, remote) = tokio::join!(self.probe_local(), self.probe_cross_origin());
    let online = any_probe_online(&[platform, local, remote]);
    debug!(platform, local, remote, online, "Connectivity probed");

    let mut state = self.lock_state();
    if online {
      state.reset();
    } else {
      state.is_offline = true;
    }
    online
  }

  async fn probe_local(&self) -> bool {
    let url = match self.page.current_url().join(&self.settings.probe_path) {
      Ok(url) => url,
      Err(_) => return false,
    };
    let request = RequestInfo::head(url).bypass_cache();
    match fetch_with_timeout(self.network.as_ref(), &request, self.settings.probe_timeout).await {
      Ok(snapshot) => snapshot.is_success(),
      Err(e) => {
        debug!(error = %e, "Local probe failed");
        false
      }
    }
  }

  /// An opaque cross-origin answer carries no status, so completing at all
  /// counts as reachable.
  async fn probe_cross_origin(&self) -> bool {
    let Some(url) = self.settings.cross_origin_probe.clone() else {
      return false;
    };
    let request = RequestInfo::head(url)
      .with_mode(RequestMode::NoCors)
      .bypass_cache();
    fetch_with_timeout(self.network.as_ref(), &request, self.settings.probe_timeout)
      .await
      .is_ok()
  }

  /// Retry `op` with exponential backoff, recording progress in the state.
  pub async fn retry_with_backoff<T, F, Fut>(&self, op: F, max_attempts: u32) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let backoff = Backoff::new(self.settings.backoff.base, max_attempts);
    let result = backoff
      .run(op, |attempt, e| self.lock_state().record_failure(attempt, e))
      .await;
    if result.is_ok() {
      self.lock_state().record_success();
    }
    result
  }

  /// Retry with the configured attempt count.
  pub async fn retry<T, F, Fut>(&self, op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    self.retry_with_backoff(op, self.settings.backoff.max_attempts).await
  }

  pub fn classify(&self, error: &Report) -> ErrorKind {
    self.classifier.classify(error, self.network.is_online())
  }

  /// Entry point for errors the page did not handle. Nothing here is fatal;
  /// the error is logged and remediation runs.
  pub async fn handle_error(&self, error: &Report) -> ErrorKind {
    let kind = self.classify(error);
    error!(kind = kind.label(), error = %format!("{:#}", error), "Unhandled page error");

    match kind {
      ErrorKind::Certificate => self.handle_certificate_error(),
      ErrorKind::Network => self.handle_network_error().await,
      ErrorKind::Timeout => {
        self.page.notify(Notice::new(
          "Tiempo Agotado",
          "La conexión está tardando mucho. Reintentando...",
          NoticeLevel::Warning,
        ));
        self.page.schedule(PageAction::Reload, TIMEOUT_RELOAD_DELAY);
      }
      ErrorKind::Unknown => {
        self.page.notify(Notice::new(
          "Error Inesperado",
          "Algo salió mal. Reintentando automáticamente...",
          NoticeLevel::Error,
        ));
        self.page.schedule(PageAction::Reload, UNKNOWN_RELOAD_DELAY);
      }
    }
    kind
  }

  /// Unhandled promise rejections arrive as plain reasons.
  pub async fn handle_rejection(&self, reason: &str) -> ErrorKind {
    self.handle_error(&eyre!("{}", reason)).await
  }

  pub fn handle_certificate_error(&self) {
    self.lock_state().certificate_error = true;
    warn!("Certificate error detected");

    let current = self.page.current_url();
    let downgrade = self.settings.allow_insecure_downgrade && current.scheme() == "https";

    if !downgrade {
      self.page.notify(Notice::new(
        "Problema de Seguridad",
        "Hay un problema con el certificado de seguridad.",
        NoticeLevel::Warning,
      ));
      return;
    }

    self.page.notify(Notice::new(
      "Problema de Seguridad",
      "Hay un problema con el certificado de seguridad. Intentando conexión alternativa...",
      NoticeLevel::Warning,
    ));
    let mut insecure = current.clone();
    if insecure.set_scheme("http").is_ok() {
      info!(url = %insecure, "Retrying over plain HTTP");
      self.page.schedule(PageAction::Navigate(insecure), DOWNGRADE_DELAY);
    }
  }

  pub async fn handle_network_error(&self) {
    warn!("Network error detected");
    self.page.notify(Notice::new(
      "Sin Conexión",
      "Verificando conectividad y activando modo offline...",
      NoticeLevel::Info,
    ));

    if !self.check_connectivity().await {
      self.activate_offline_mode();
      return;
    }

    self.page.notify(Notice::new(
      "Problema de Conexión",
      "Hay conectividad pero el servidor no responde. Reintentando...",
      NoticeLevel::Warning,
    ));
    self.try_alternative_origins().await;
  }

  /// Probe each alternate origin in order. The first one that answers wins;
  /// if it is not where the page already is, the page is moved there.
  pub async fn try_alternative_origins(&self) -> bool {
    let current = self.page.current_url();

    for origin in &self.settings.fallback_origins {
      let probe = match origin.join(&self.settings.probe_path) {
        Ok(url) => url,
        Err(e) => {
          warn!(origin = %origin, error = %e, "Skipping unusable origin");
          continue;
        }
      };
      debug!(origin = %origin, "Trying alternate origin");

      let request = RequestInfo::head(probe).bypass_cache();
      match fetch_with_timeout(self.network.as_ref(), &request, self.settings.probe_timeout).await {
        Ok(snapshot) if snapshot.is_success() => {
          info!(origin = %origin, "Alternate origin answered");
          if origin.origin() != current.origin() {
            self.switch_origin(origin, &current);
          }
          return true;
        }
        Ok(snapshot) => {
          warn!(origin = %origin, status = snapshot.status, "Alternate origin failed")
        }
        Err(e) => warn!(origin = %origin, error = %e, "Alternate origin failed"),
      }
    }

    self.activate_offline_mode();
    false
  }

  fn switch_origin(&self, origin: &Url, current: &Url) {
    let target = match origin.join(current.path()) {
      Ok(url) => url,
      Err(_) => origin.clone(),
    };
    self.page.notify(Notice::new(
      "Redirigiendo",
      "Conectando a servidor alternativo...",
      NoticeLevel::Success,
    ));
    self.page.schedule(PageAction::Navigate(target), SWITCH_ORIGIN_DELAY);
  }

  pub fn activate_offline_mode(&self) {
    info!("Activating offline mode");
    self.lock_state().is_offline = true;
    self.page.notify(Notice::new(
      "Modo Offline",
      "Trabajando sin conexión. Funcionalidad limitada disponible.",
      NoticeLevel::Info,
    ));
    self.page.set_offline(true);
  }

  /// Manual retry from the offline banner.
  pub async fn check_connection(&self) -> bool {
    self.page.notify(Notice::new(
      "Verificando",
      "Comprobando conexión...",
      NoticeLevel::Info,
    ));

    if self.check_connectivity().await {
      self.page.set_offline(false);
      self.page.notify(Notice::new(
        "Conectado",
        "Conexión restaurada",
        NoticeLevel::Success,
      ));
      self.page.schedule(PageAction::Reload, RECONNECTED_RELOAD_DELAY);
      true
    } else {
      self.page.notify(Notice::new(
        "Sin Conexión",
        "Aún no hay conexión disponible",
        NoticeLevel::Warning,
      ));
      false
    }
  }

  /// Platform reports the network is back.
  pub async fn on_online(&self) -> bool {
    info!("Connection restored");
    self.check_connection().await
  }

  /// Platform reports the network is gone.
  pub fn on_offline(&self) {
    info!("Connection lost");
    self.activate_offline_mode();
  }
}
