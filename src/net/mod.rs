//! Network seam between the worker and the origin server.
//!
//! Everything the worker knows about the outside world goes through the
//! [`Network`] trait so strategies can be exercised against scripted fakes.

mod request;

pub use request::{RequestInfo, RequestMode};

use color_eyre::eyre::{Report, WrapErr};
use color_eyre::Result;
use std::fmt;
use std::future::Future;
use std::net::UdpSocket;
use std::time::Duration;

use crate::cache::Snapshot;

/// Something that can perform fetches and report the platform online flag.
pub trait Network: Send + Sync + 'static {
  /// Perform the request. Non-2xx statuses are returned as snapshots, not errors.
  fn fetch(&self, request: &RequestInfo) -> impl Future<Output = Result<Snapshot>> + Send;

  /// Cheap local guess at whether any network is reachable at all.
  fn is_online(&self) -> bool {
    true
  }
}

/// Raised when a fetch exceeds its wait budget. The in-flight call is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeout {
  pub limit: Duration,
}

impl fmt::Display for FetchTimeout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "timeout after {}ms", self.limit.as_millis())
  }
}

impl std::error::Error for FetchTimeout {}

/// Fetch with a bounded wait. On expiry the request future is dropped, which
/// aborts the underlying connection, and a [`FetchTimeout`] is returned.
pub async fn fetch_with_timeout<N: Network>(
  network: &N,
  request: &RequestInfo,
  limit: Duration,
) -> Result<Snapshot> {
  match tokio::time::timeout(limit, network.fetch(request)).await {
    Ok(result) => result,
    Err(_) => Err(Report::new(FetchTimeout { limit })),
  }
}

/// reqwest-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .wrap_err("Failed to build HTTP client")?;

    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  fn fetch(&self, request: &RequestInfo) -> impl Future<Output = Result<Snapshot>> + Send {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    let url = request.url.clone();

    async move {
      let response = builder
        .send()
        .await
        .wrap_err_with(|| format!("Failed to fetch {}", url))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
      let body = response
        .bytes()
        .await
        .wrap_err_with(|| format!("Failed to read body of {}", url))?;

      Ok(Snapshot {
        status,
        headers,
        body: body.to_vec(),
      })
    }
  }

  /// Binding a UDP socket and "connecting" it only consults the routing
  /// table; no packet leaves the host.
  fn is_online(&self) -> bool {
    UdpSocket::bind("0.0.0.0:0")
      .and_then(|socket| socket.connect("8.8.8.8:53"))
      .is_ok()
  }
}

#[cfg(test)]
pub mod testing {
  //! Scripted network used across the crate's tests.

  use super::*;
  use color_eyre::eyre::eyre;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;

  #[derive(Clone)]
  pub enum Reply {
    Respond(Snapshot),
    Fail(String),
    /// Never answers; only a timeout gets the caller out.
    Hang,
  }

  #[derive(Default)]
  pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Reply>>,
    log: Mutex<Vec<RequestInfo>>,
    offline: AtomicBool,
  }

  impl FakeNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn respond(&self, url: &str, snapshot: Snapshot) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Reply::Respond(snapshot));
    }

    pub fn ok(&self, url: &str, content_type: &str, body: &str) {
      self.respond(url, Snapshot::text(200, content_type, body));
    }

    pub fn fail(&self, url: &str, message: &str) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Reply::Fail(message.to_string()));
    }

    pub fn hang(&self, url: &str) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Reply::Hang);
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    /// (method, url) of every request seen so far.
    pub fn requests(&self) -> Vec<(String, String)> {
      self
        .log
        .lock()
        .unwrap()
        .iter()
        .map(|r| (r.method.to_string(), r.url.to_string()))
        .collect()
    }

    pub fn hits(&self, url: &str) -> usize {
      self.requests().iter().filter(|(_, u)| u == url).count()
    }

    /// Most recent request sent to `url`, headers included.
    pub fn last_request(&self, url: &str) -> Option<RequestInfo> {
      self
        .log
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find(|r| r.url.as_str() == url)
        .cloned()
    }

    /// Whether the last request to `url` asked intermediaries to revalidate.
    pub fn bypassed_cache(&self, url: &str) -> bool {
      self.last_request(url).is_some_and(|r| {
        r.headers.iter().any(|(k, v)| k == "Cache-Control" && v == "no-cache")
          && r.headers.iter().any(|(k, v)| k == "Pragma" && v == "no-cache")
      })
    }
  }

  impl Network for FakeNetwork {
    fn fetch(&self, request: &RequestInfo) -> impl Future<Output = Result<Snapshot>> + Send {
      let url = request.url.to_string();
      self.log.lock().unwrap().push(request.clone());
      let reply = self.routes.lock().unwrap().get(&url).cloned();

      async move {
        match reply {
          Some(Reply::Respond(snapshot)) => Ok(snapshot),
          Some(Reply::Fail(message)) => Err(eyre!("{}", message)),
          Some(Reply::Hang) => futures::future::pending().await,
          None => Err(eyre!("network error: connection refused for {}", url)),
        }
      }
    }

    fn is_online(&self) -> bool {
      !self.offline.load(Ordering::SeqCst)
    }
  }
}
