//! Pages connected to the worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use url::Url;

pub type ClientId = u64;

/// Messages the worker pushes to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
  /// The worker took control of this page
  Controlled { version: String },
  /// Reload this URL from scratch
  Navigate(Url),
}

struct Client {
  url: Url,
  controlled: bool,
  tx: mpsc::UnboundedSender<ClientNotice>,
}

#[derive(Default)]
struct Registry {
  next_id: ClientId,
  clients: HashMap<ClientId, Client>,
}

/// Shared registry of open pages. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct ClientRegistry {
  inner: Arc<Mutex<Registry>>,
}

impl ClientRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Registry> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Register a page showing `url`.
  pub fn connect(&self, url: Url) -> (ClientId, mpsc::UnboundedReceiver<ClientNotice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut registry = self.lock();
    let id = registry.next_id;
    registry.next_id += 1;
    registry.clients.insert(
      id,
      Client {
        url,
        controlled: false,
        tx,
      },
    );
    (id, rx)
  }

  pub fn disconnect(&self, id: ClientId) {
    self.lock().clients.remove(&id);
  }

  pub fn len(&self) -> usize {
    self.lock().clients.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_controlled(&self, id: ClientId) -> bool {
    self
      .lock()
      .clients
      .get(&id)
      .map(|c| c.controlled)
      .unwrap_or(false)
  }

  /// Take control of every open page. Returns how many were claimed.
  pub fn claim(&self, version: &str) -> usize {
    let mut registry = self.lock();
    registry.clients.retain(|_, client| {
      client.controlled = true;
      client
        .tx
        .send(ClientNotice::Controlled {
          version: version.to_string(),
        })
        .is_ok()
    });
    registry.clients.len()
  }

  /// Tell every page to reload. Pages whose receiver is gone are dropped.
  pub fn broadcast_refresh(&self) -> usize {
    let mut registry = self.lock();
    registry
      .clients
      .retain(|_, client| client.tx.send(ClientNotice::Navigate(client.url.clone())).is_ok());
    registry.clients.len()
  }
}
