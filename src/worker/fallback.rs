//! Synthetic responses used when neither cache nor network can answer.

use url::Url;

use super::router::AssetCategory;
use crate::cache::Snapshot;

/// Cached page to try for a navigation, picked by route prefix. First match wins.
const FALLBACK_ROUTES: &[(&str, &str)] = &[
  ("login", "/login.html"),
  ("test", "/safari-test.html"),
  ("index", "/index.html"),
];

/// Generic home pages tried after the route-specific page, in order.
pub const HOME_PAGES: &[&str] = &["/safari-inicio.html", "/index.html", "/"];

/// Pick the cached page that best stands in for `path`.
pub fn fallback_page_for(path: &str) -> &'static str {
  if path == "/" {
    return "/index.html";
  }
  FALLBACK_ROUTES
    .iter()
    .find(|(needle, _)| path.contains(needle))
    .map(|(_, page)| *page)
    .unwrap_or(HOME_PAGES[0])
}

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0, user-scalable=no">
  <meta name="apple-mobile-web-app-capable" content="yes">
  <title>Sin conexión - Comunicaciones Internas</title>
  <style>
    body {
      font-family: -apple-system, BlinkMacSystemFont, sans-serif;
      text-align: center;
      padding: 50px 20px;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      color: white;
      margin: 0;
      min-height: 100vh;
      display: flex;
      flex-direction: column;
      justify-content: center;
    }
    .container { background: rgba(255,255,255,0.1); padding: 30px; border-radius: 15px; }
    button {
      background: rgba(255,255,255,0.2);
      border: 2px solid rgba(255,255,255,0.3);
      color: white;
      padding: 15px 30px;
      border-radius: 25px;
      font-size: 16px;
      cursor: pointer;
      margin-top: 20px;
    }
  </style>
</head>
<body>
  <div class="container">
    <h1>Sin conexión</h1>
    <p>No se puede cargar la página en este momento.</p>
    <p>Verifica tu conexión a internet e inténtalo de nuevo.</p>
    <button id="retry" onclick="window.location.reload()">Reintentar</button>
    <button onclick="window.location.href='/safari-inicio.html'">Ir al inicio</button>
  </div>
</body>
</html>
"#;

/// Self-contained offline document. Served as 200 so it renders as a page.
pub fn offline_page() -> Snapshot {
  Snapshot::text(200, "text/html; charset=utf-8", OFFLINE_PAGE)
}

/// Typed placeholder for a static asset that could not be loaded.
pub fn for_asset(url: &Url) -> Snapshot {
  match AssetCategory::of(url) {
    AssetCategory::Stylesheet => stylesheet(url),
    AssetCategory::Script => script(url),
    AssetCategory::Image => image_placeholder(),
    AssetCategory::Other => Snapshot::text(404, "text/plain", "Resource not available"),
  }
}

fn stylesheet(url: &Url) -> Snapshot {
  let source = url.as_str().replace("*/", "*\\/");
  let body = format!(
    r#"/* Fallback stylesheet for {source} */
body {{ font-family: -apple-system, BlinkMacSystemFont, sans-serif; }}
.error-fallback {{
  background: #f44336;
  color: white;
  padding: 10px;
  text-align: center;
  position: fixed;
  top: 0;
  left: 0;
  right: 0;
  z-index: 9999;
}}
"#
  );
  Snapshot::text(200, "text/css; charset=utf-8", body)
}

/// Shows a single "resources unavailable" banner once the page loads and
/// removes it after five seconds.
fn script(url: &Url) -> Snapshot {
  let source = serde_json::to_string(url.as_str()).unwrap_or_else(|_| "\"\"".to_string());
  let body = format!(
    r#"// Fallback script
console.warn('Script not available:', {source});
if (typeof window !== 'undefined' && !window.__swcacheFallbackBanner) {{
  window.__swcacheFallbackBanner = true;
  window.addEventListener('load', function () {{
    var banner = document.createElement('div');
    banner.className = 'error-fallback';
    banner.textContent = 'Algunos recursos no están disponibles. Verifica tu conexión.';
    document.body.insertBefore(banner, document.body.firstChild);
    setTimeout(function () {{ banner.remove(); }}, 5000);
  }});
}}
"#
  );
  Snapshot::text(200, "application/javascript; charset=utf-8", body)
}

fn image_placeholder() -> Snapshot {
  let body = r##"<svg xmlns="http://www.w3.org/2000/svg"
  width="100" height="100" viewBox="0 0 100 100">
  <rect width="100" height="100" fill="#f0f0f0"/>
  <text x="50" y="50" text-anchor="middle" dy=".3em"
    font-family="Arial" font-size="12" fill="#999">Imagen no disponible</text>
</svg>
"##;
  Snapshot::text(200, "image/svg+xml", body)
}

/// 503 for API-style paths: machine-readable body the page can branch on.
pub fn api_unavailable() -> Snapshot {
  let body = serde_json::json!({
    "error": "Service temporarily unavailable",
    "message": "Please check your connection and try again",
    "offline": true,
  });
  Snapshot::text(503, "application/json", body.to_string()).with_header("Cache-Control", "no-cache")
}

pub fn service_unavailable() -> Snapshot {
  Snapshot::text(503, "text/plain", "Service unavailable")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_page_for_routes() {
    assert_eq!(fallback_page_for("/login"), "/login.html");
    assert_eq!(fallback_page_for("/login.html"), "/login.html");
    assert_eq!(fallback_page_for("/safari-test.html"), "/safari-test.html");
    assert_eq!(fallback_page_for("/"), "/index.html");
    assert_eq!(fallback_page_for("/index.html"), "/index.html");
    assert_eq!(fallback_page_for("/dashboard"), "/safari-inicio.html");
  }

  #[test]
  fn test_offline_page_is_a_renderable_document() {
    let page = offline_page();
    assert_eq!(page.status, 200);
    assert!(page.content_type().unwrap().starts_with("text/html"));
    let html = page.body_text();
    assert!(html.contains("<title>Sin conexión"));
    assert!(html.contains("Reintentar"));
    assert!(!html.contains("<link"));
    assert!(!html.contains("<script src"));
  }

  #[test]
  fn test_asset_fallbacks_match_category() {
    let css = for_asset(&Url::parse("https://a.example/styles/app.css").unwrap());
    assert!(css.content_type().unwrap().starts_with("text/css"));
    assert!(css.body_text().contains(".error-fallback"));

    let js = for_asset(&Url::parse("https://a.example/js/app.js").unwrap());
    assert!(js.content_type().unwrap().starts_with("application/javascript"));
    assert!(js.body_text().contains("setTimeout"));

    let img = for_asset(&Url::parse("https://a.example/img/a.png").unwrap());
    assert_eq!(img.content_type(), Some("image/svg+xml"));
    assert!(img.body_text().contains("Imagen no disponible"));

    let font = for_asset(&Url::parse("https://a.example/fonts/a.woff2").unwrap());
    assert_eq!(font.status, 404);
  }

  #[test]
  fn test_stylesheet_comment_cannot_be_closed_by_url() {
    let css = for_asset(&Url::parse("https://a.example/a*/b.css").unwrap());
    let body = css.body_text();
    let first_line = body.lines().next().unwrap();
    assert_eq!(first_line.matches("*/").count(), 1);
  }

  #[test]
  fn test_api_unavailable_body() {
    let snapshot = api_unavailable();
    assert_eq!(snapshot.status, 503);
    assert_eq!(snapshot.header("cache-control"), Some("no-cache"));
    let body: serde_json::Value = serde_json::from_slice(&snapshot.body).unwrap();
    assert_eq!(body["offline"], true);
    assert!(body["error"].is_string());
    assert!(body["message"].is_string());
  }
}
