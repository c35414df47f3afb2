//! Core types for the response cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::net::RequestInfo;

/// Captured response: status, headers and body.
///
/// Snapshots are immutable once stored; a refresh replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Snapshot {
  /// Build a text response with a single content-type header.
  pub fn text(status: u16, content_type: &str, body: impl Into<String>) -> Self {
    Self {
      status,
      headers: vec![("Content-Type".to_string(), content_type.to_string())],
      body: body.into().into_bytes(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Only 2xx responses may be stored.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Request identity used as the partition key: method + absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_uppercase(),
      url: normalize_url(url),
    }
  }

  pub fn of(request: &RequestInfo) -> Self {
    Self::new(request.method.as_str(), request.url.as_str())
  }

  /// SHA256 hash for stable, fixed-length keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Fragments never reach the server, so they never distinguish entries.
fn normalize_url(url: &str) -> String {
  match url.split_once('#') {
    Some((base, _)) => base.to_string(),
    None => url.to_string(),
  }
}

/// What a partition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
  /// Versioned app-shell label partition
  Shell,
  /// Install-time and static asset responses
  Static,
  /// Navigations and API responses captured at runtime
  Dynamic,
}

impl Purpose {
  pub fn as_str(self) -> &'static str {
    match self {
      Purpose::Shell => "shell",
      Purpose::Static => "static",
      Purpose::Dynamic => "dynamic",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "shell" => Some(Purpose::Shell),
      "static" => Some(Purpose::Static),
      "dynamic" => Some(Purpose::Dynamic),
      _ => None,
    }
  }
}

/// Handle to an opened partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  pub name: String,
  pub purpose: Purpose,
}

/// Partition listing entry.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
  pub name: String,
  pub purpose: Purpose,
  pub entries: usize,
  pub created_at: DateTime<Utc>,
}

/// A stored snapshot with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedSnapshot {
  pub partition: String,
  pub snapshot: Snapshot,
  pub stored_at: DateTime<Utc>,
}

/// Response handed back to the page, including where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub snapshot: Snapshot,
  pub source: ResponseSource,
}

impl Served {
  pub fn from_network(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(cached: CachedSnapshot) -> Self {
    Self {
      snapshot: cached.snapshot,
      source: ResponseSource::Cache {
        partition: cached.partition,
        stored_at: cached.stored_at,
      },
    }
  }

  pub fn fallback_page(path: &str, cached: CachedSnapshot) -> Self {
    Self {
      snapshot: cached.snapshot,
      source: ResponseSource::FallbackPage(path.to_string()),
    }
  }

  pub fn synthetic(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      source: ResponseSource::Synthetic,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh response from the origin
  Network,
  /// Exact match from a partition
  Cache {
    partition: String,
    stored_at: DateTime<Utc>,
  },
  /// A different cached page chosen by the navigation fallback chain
  FallbackPage(String),
  /// Generated by the worker; nothing was cached or reachable
  Synthetic,
}

impl ResponseSource {
  pub fn label(&self) -> String {
    match self {
      ResponseSource::Network => "network".to_string(),
      ResponseSource::Cache { partition, .. } => format!("cache ({})", partition),
      ResponseSource::FallbackPage(path) => format!("fallback page {}", path),
      ResponseSource::Synthetic => "synthetic".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_key_ignores_fragment_and_method_case() {
    let a = RequestKey::new("get", "https://a.example/page#top");
    let b = RequestKey::new("GET", "https://a.example/page");
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_request_key_distinguishes_methods() {
    let get = RequestKey::new("GET", "https://a.example/api/x");
    let post = RequestKey::new("POST", "https://a.example/api/x");
    assert_ne!(get.cache_hash(), post.cache_hash());
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let snapshot = Snapshot::text(200, "text/css", "body {}");
    assert_eq!(snapshot.content_type(), Some("text/css"));
    assert_eq!(snapshot.header("CONTENT-TYPE"), Some("text/css"));
  }

  #[test]
  fn test_success_range() {
    assert!(Snapshot::text(204, "text/plain", "").is_success());
    assert!(!Snapshot::text(304, "text/plain", "").is_success());
    assert!(!Snapshot::text(503, "text/plain", "").is_success());
  }
}
