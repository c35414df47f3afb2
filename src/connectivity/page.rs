//! The page surface remediation acts on.

use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Info,
  Warning,
  Error,
  Success,
}

/// A transient message shown to the user for a few seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub title: String,
  pub message: String,
  pub level: NoticeLevel,
}

impl Notice {
  pub fn new(title: &str, message: &str, level: NoticeLevel) -> Self {
    Self {
      title: title.to_string(),
      message: message.to_string(),
      level,
    }
  }
}

/// How long a notice stays visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
  Reload,
  Navigate(Url),
}

/// What the connectivity engine needs from whatever is showing the app.
pub trait Page: Send + Sync {
  fn notify(&self, notice: Notice);

  /// Toggle offline mode: persistent banner with a retry control, and
  /// network-dependent controls disabled while set.
  fn set_offline(&self, offline: bool);

  /// Run `action` once `delay` has elapsed.
  fn schedule(&self, action: PageAction, delay: Duration);

  fn current_url(&self) -> Url;
}
