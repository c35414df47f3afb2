//! Request descriptors handed to the worker.

use reqwest::Method;
use url::Url;

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page load
  Navigate,
  SameOrigin,
  /// Cross-origin request whose answer is opaque
  NoCors,
}

/// A fetch as seen by the worker: target, verb, mode and extra headers.
#[derive(Debug, Clone)]
pub struct RequestInfo {
  pub url: Url,
  pub method: Method,
  pub mode: RequestMode,
  pub headers: Vec<(String, String)>,
}

impl RequestInfo {
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: Method::GET,
      mode: RequestMode::SameOrigin,
      headers: Vec::new(),
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn head(url: Url) -> Self {
    Self {
      method: Method::HEAD,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  /// Ask every intermediate cache to revalidate with the origin.
  pub fn bypass_cache(mut self) -> Self {
    self
      .headers
      .push(("Cache-Control".to_string(), "no-cache".to_string()));
    self.headers.push(("Pragma".to_string(), "no-cache".to_string()));
    self
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }
}
