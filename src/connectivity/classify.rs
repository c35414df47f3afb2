//! Error classification for remediation.
//!
//! The heuristic classifier reads error text and is inherently fragile. It
//! sits behind [`ErrorClassifier`] so a structured source can take over:
//! [`TransportClassifier`] inspects typed errors first and only falls back to
//! the text heuristics when nothing structured is available.

use color_eyre::eyre::Report;

use crate::net::FetchTimeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Certificate,
  Network,
  Timeout,
  Unknown,
}

impl ErrorKind {
  pub fn label(self) -> &'static str {
    match self {
      ErrorKind::Certificate => "certificate",
      ErrorKind::Network => "network",
      ErrorKind::Timeout => "timeout",
      ErrorKind::Unknown => "unknown",
    }
  }
}

pub trait ErrorClassifier: Send + Sync {
  /// `platform_online` is the host's own online flag at the time of the error.
  fn classify(&self, error: &Report, platform_online: bool) -> ErrorKind;
}

/// Message-text heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

const CERTIFICATE_TERMS: &[&str] = &["certificate", "ssl", "tls", "security"];
const NETWORK_TERMS: &[&str] = &["network", "fetch", "connection"];

impl ErrorClassifier for HeuristicClassifier {
  fn classify(&self, error: &Report, platform_online: bool) -> ErrorKind {
    // Include the whole cause chain, not just the outermost context
    let text = format!("{:#}", error).to_lowercase();
    classify_text(&text, platform_online)
  }
}

pub fn classify_text(text: &str, platform_online: bool) -> ErrorKind {
  let text = text.to_lowercase();
  if CERTIFICATE_TERMS.iter().any(|t| text.contains(t)) {
    ErrorKind::Certificate
  } else if NETWORK_TERMS.iter().any(|t| text.contains(t)) || !platform_online {
    ErrorKind::Network
  } else if text.contains("timeout") || text.contains("timed out") {
    ErrorKind::Timeout
  } else {
    ErrorKind::Unknown
  }
}

/// Typed errors first, heuristics second.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportClassifier<F = HeuristicClassifier> {
  fallback: F,
}

impl<F: ErrorClassifier> ErrorClassifier for TransportClassifier<F> {
  fn classify(&self, error: &Report, platform_online: bool) -> ErrorKind {
    for cause in error.chain() {
      if cause.downcast_ref::<FetchTimeout>().is_some() {
        return ErrorKind::Timeout;
      }
      if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
        if e.is_timeout() {
          return ErrorKind::Timeout;
        }
        // Certificate failures surface as connect errors; let the text decide
        if e.is_connect() && !format!("{:#}", error).to_lowercase().contains("certificate") {
          return ErrorKind::Network;
        }
      }
    }
    self.fallback.classify(error, platform_online)
  }
}
