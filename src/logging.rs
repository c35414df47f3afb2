//! Tracing subscriber setup.
//!
//! Filter priority, highest first: `SWCACHE_LOG`, `RUST_LOG`, then the level
//! implied by `--verbose` / `--quiet`. Logs go to stderr, except under the
//! terminal monitor where stdout and stderr belong to the UI and logs go to a
//! daily file instead.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SWCACHE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
  Quiet,
  Normal,
  Verbose,
}

impl Verbosity {
  /// Verbose wins when both flags are given.
  pub fn from_flags(verbose: bool, quiet: bool) -> Self {
    if verbose {
      Self::Verbose
    } else if quiet {
      Self::Quiet
    } else {
      Self::Normal
    }
  }

  pub fn default_level(self) -> Level {
    match self {
      Self::Quiet => Level::ERROR,
      Self::Normal => Level::INFO,
      Self::Verbose => Level::DEBUG,
    }
  }
}

/// Log to stderr.
pub fn init_stderr(verbosity: Verbosity) -> Result<()> {
  let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
  let layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_ansi(use_ansi)
    .with_target(verbosity == Verbosity::Verbose);

  tracing_subscriber::registry()
    .with(build_env_filter(verbosity))
    .with(layer.compact())
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}

/// Log to `swcache.log.<date>` in `dir`. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init_file(verbosity: Verbosity, dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "swcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let layer = fmt::layer().with_writer(writer).with_ansi(false);

  tracing_subscriber::registry()
    .with(build_env_filter(verbosity))
    .with(layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
  // Unparseable directives fall through rather than fail
  if let Ok(directives) = std::env::var(LOG_ENV) {
    if let Ok(filter) = EnvFilter::try_new(&directives) {
      return filter;
    }
  }

  if let Ok(filter) = EnvFilter::try_from_default_env() {
    return filter;
  }

  let level = verbosity.default_level();
  let directive = match verbosity {
    // Dependencies stay at warn; our own crate gets the chosen level
    Verbosity::Verbose | Verbosity::Normal => format!("warn,swcache={}", level),
    Verbosity::Quiet => level.to_string(),
  };
  EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_verbosity_from_flags() {
    assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
    assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
    assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
  }

  #[test]
  fn test_default_levels() {
    assert_eq!(Verbosity::Quiet.default_level(), Level::ERROR);
    assert_eq!(Verbosity::Normal.default_level(), Level::INFO);
    assert_eq!(Verbosity::Verbose.default_level(), Level::DEBUG);
  }

  #[test]
  fn test_filters_build_for_every_verbosity() {
    for verbosity in [Verbosity::Quiet, Verbosity::Normal, Verbosity::Verbose] {
      let _ = build_env_filter(verbosity);
    }
  }
}
