//! Request classification.

use reqwest::Method;
use url::Url;

use crate::net::{RequestInfo, RequestMode};

/// Which strategy handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
  /// Top-level page load
  Navigate,
  /// Stylesheets, scripts, images and fonts
  Static,
  /// APIs and anything dynamic
  Other,
}

const STATIC_EXTENSIONS: &[&str] = &[
  "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "eot", "webp",
  "avif",
];

/// Classify a request, or return `None` when the worker must leave it alone
/// (non-http schemes and browser-extension URLs).
pub fn classify(request: &RequestInfo) -> Option<RequestKind> {
  if !is_proxyable(&request.url) {
    return None;
  }

  let kind = if request.mode == RequestMode::Navigate {
    RequestKind::Navigate
  } else if is_static_url(&request.url) {
    RequestKind::Static
  } else {
    RequestKind::Other
  };
  Some(kind)
}

fn is_proxyable(url: &Url) -> bool {
  matches!(url.scheme(), "http" | "https") && !url.as_str().contains("extension://")
}

/// Lowercased extension of the last path segment, if any.
pub fn extension(url: &Url) -> Option<String> {
  let segment = url.path_segments()?.last()?;
  let (_, ext) = segment.rsplit_once('.')?;
  if ext.is_empty() {
    return None;
  }
  Some(ext.to_ascii_lowercase())
}

pub fn is_static_url(url: &Url) -> bool {
  extension(url)
    .map(|ext| STATIC_EXTENSIONS.contains(&ext.as_str()))
    .unwrap_or(false)
}

/// Paths that follow the JSON API convention.
pub fn is_api_path(url: &Url) -> bool {
  url.path().contains("/api/")
}

/// Only GET responses are ever read back from the cache.
pub fn is_cacheable_method(method: &Method) -> bool {
  *method == Method::GET
}

/// Content category used to pick a synthetic fallback for a static asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
  Stylesheet,
  Script,
  Image,
  Other,
}

impl AssetCategory {
  pub fn of(url: &Url) -> Self {
    match extension(url).as_deref() {
      Some("css") => AssetCategory::Stylesheet,
      Some("js") | Some("mjs") => AssetCategory::Script,
      Some("svg" | "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "ico") => {
        AssetCategory::Image
      }
      _ => AssetCategory::Other,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn req(url: &str) -> RequestInfo {
    RequestInfo::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_navigation_wins_over_extension() {
    let request = RequestInfo::navigate(Url::parse("https://a.example/index.html").unwrap());
    assert_eq!(classify(&request), Some(RequestKind::Navigate));
  }

  #[test]
  fn test_static_extensions() {
    for url in [
      "https://a.example/css/styles.css",
      "https://a.example/js/app.js?v=2",
      "https://a.example/img/app-icon.SVG",
      "https://a.example/fonts/x.woff2",
    ] {
      assert_eq!(classify(&req(url)), Some(RequestKind::Static), "{}", url);
    }
  }

  #[test]
  fn test_other_requests() {
    assert_eq!(
      classify(&req("https://a.example/api/messages")),
      Some(RequestKind::Other)
    );
    assert_eq!(
      classify(&req("https://a.example/data.json")),
      Some(RequestKind::Other)
    );
    // Extension-looking query strings do not make a request static
    assert_eq!(
      classify(&req("https://a.example/api/x?file=a.css")),
      Some(RequestKind::Other)
    );
  }

  #[test]
  fn test_ignored_requests() {
    assert_eq!(classify(&req("chrome-extension://abcdef/script.js")), None);
    assert_eq!(classify(&req("moz-extension://abcdef/icon.png")), None);
    assert_eq!(classify(&req("data:text/plain,hello")), None);
    assert_eq!(
      classify(&req("https://a.example/proxy?u=chrome-extension://x")),
      None
    );
  }

  #[test]
  fn test_asset_category() {
    let cat = |u: &str| AssetCategory::of(&Url::parse(u).unwrap());
    assert_eq!(cat("https://a.example/styles/app.css"), AssetCategory::Stylesheet);
    assert_eq!(cat("https://a.example/js/app.js"), AssetCategory::Script);
    assert_eq!(cat("https://a.example/img/logo.PNG"), AssetCategory::Image);
    assert_eq!(cat("https://a.example/fonts/a.ttf"), AssetCategory::Other);
  }

  #[test]
  fn test_api_paths() {
    assert!(is_api_path(&Url::parse("https://a.example/api/users").unwrap()));
    assert!(!is_api_path(&Url::parse("https://a.example/apidocs").unwrap()));
  }
}
