//! Client control messages and push payloads.

use serde::{Deserialize, Serialize};
use url::Url;

/// The control messages a page may post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
  /// Activate a waiting worker immediately
  SkipWaiting,
  /// Ask for the worker version
  GetVersion,
}

#[derive(Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  kind: Option<String>,
}

impl ClientMessage {
  /// Parse `{ "type": ... }`. Unknown types and malformed JSON yield `None`.
  pub fn parse(raw: &str) -> Option<Self> {
    let envelope: Envelope = serde_json::from_str(raw).ok()?;
    match envelope.kind.as_deref()? {
      "SKIP_WAITING" => Some(ClientMessage::SkipWaiting),
      "GET_VERSION" => Some(ClientMessage::GetVersion),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReply {
  pub version: String,
}

const DEFAULT_TITLE: &str = "Comunicaciones Internas";
const DEFAULT_BODY: &str = "Tienes un nuevo mensaje";
const DEFAULT_ICON: &str = "/img/app-icon.svg";

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  content: Option<String>,
  icon: Option<String>,
  url: Option<String>,
}

/// Notification to display for an incoming push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub url: String,
}

impl Notification {
  /// Build from a raw push payload. Missing fields, or a payload that is not
  /// JSON at all, fall back to fixed defaults.
  pub fn from_payload(payload: Option<&[u8]>) -> Self {
    let parsed: PushPayload = payload
      .and_then(|bytes| serde_json::from_slice(bytes).ok())
      .unwrap_or_default();

    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

    Self {
      title: non_empty(parsed.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: non_empty(parsed.body)
        .or_else(|| non_empty(parsed.content))
        .unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: non_empty(parsed.icon).unwrap_or_else(|| DEFAULT_ICON.to_string()),
      url: non_empty(parsed.url).unwrap_or_else(|| "/".to_string()),
    }
  }

  /// Absolute page to open when the notification is clicked. Targets on
  /// another origin are replaced by the app root.
  pub fn target(&self, origin: &Url) -> Url {
    match origin.join(&self.url) {
      Ok(url) if url.origin() == origin.origin() => url,
      _ => origin.join("/").unwrap_or_else(|_| origin.clone()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_known_messages() {
    assert_eq!(
      ClientMessage::parse(r#"{"type":"SKIP_WAITING"}"#),
      Some(ClientMessage::SkipWaiting)
    );
    assert_eq!(
      ClientMessage::parse(r#"{"type":"GET_VERSION","extra":1}"#),
      Some(ClientMessage::GetVersion)
    );
  }

  #[test]
  fn test_unknown_messages_are_ignored() {
    assert_eq!(ClientMessage::parse(r#"{"type":"CLEAR_ALL"}"#), None);
    assert_eq!(ClientMessage::parse(r#"{"kind":"SKIP_WAITING"}"#), None);
    assert_eq!(ClientMessage::parse("not json"), None);
    assert_eq!(ClientMessage::parse(r#"{"type":42}"#), None);
  }

  #[test]
  fn test_push_payload_fields() {
    let n = Notification::from_payload(Some(
      br#"{"title":"Aviso","content":"Reunion a las 10","url":"/mensajes"}"#,
    ));
    assert_eq!(n.title, "Aviso");
    assert_eq!(n.body, "Reunion a las 10");
    assert_eq!(n.icon, DEFAULT_ICON);
    assert_eq!(n.url, "/mensajes");
  }

  #[test]
  fn test_malformed_push_uses_defaults() {
    for payload in [None, Some(&b"{oops"[..]), Some(&b"plain text"[..])] {
      let n = Notification::from_payload(payload);
      assert_eq!(n.title, DEFAULT_TITLE);
      assert_eq!(n.body, DEFAULT_BODY);
    }
  }

  #[test]
  fn test_notification_target_stays_on_origin() {
    let origin = Url::parse("https://a.example/").unwrap();
    let local = Notification::from_payload(Some(br#"{"url":"/mensajes?id=3"}"#));
    assert_eq!(local.target(&origin).as_str(), "https://a.example/mensajes?id=3");

    let foreign = Notification::from_payload(Some(br#"{"url":"https://evil.example/"}"#));
    assert_eq!(foreign.target(&origin).as_str(), "https://a.example/");
  }
}
