use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the shell is served from (e.g. https://intranet.example:8443)
  pub origin: Url,
  /// Version label appended to every partition name
  #[serde(default = "default_version")]
  pub version: String,
  /// Prefix for the version-labelled shell partition
  #[serde(default = "default_cache_prefix")]
  pub cache_prefix: String,
  /// Files the app shell needs to render offline
  #[serde(default = "default_essential_files")]
  pub essential_files: Vec<String>,
  /// Files that improve the offline experience but may be missing
  #[serde(default = "default_optional_files")]
  pub optional_files: Vec<String>,
  #[serde(default)]
  pub timeouts: TimeoutsConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  #[serde(default)]
  pub dev: DevConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
  pub navigation_ms: u64,
  pub static_ms: u64,
  pub dynamic_ms: u64,
  pub probe_ms: u64,
}

impl Default for TimeoutsConfig {
  fn default() -> Self {
    Self {
      navigation_ms: 5000,
      static_ms: 3000,
      dynamic_ms: 8000,
      probe_ms: 5000,
    }
  }
}

impl TimeoutsConfig {
  pub fn navigation(&self) -> Duration {
    Duration::from_millis(self.navigation_ms)
  }

  pub fn static_assets(&self) -> Duration {
    Duration::from_millis(self.static_ms)
  }

  pub fn dynamic(&self) -> Duration {
    Duration::from_millis(self.dynamic_ms)
  }

  pub fn probe(&self) -> Duration {
    Duration::from_millis(self.probe_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  /// Small same-origin resource probed with HEAD
  pub probe_path: String,
  /// Opportunistic cross-origin probe; set to null to disable
  pub cross_origin_probe: Option<Url>,
  /// Alternate origins tried in order when the server stops answering.
  /// Empty means "derive from the configured origin".
  pub fallback_origins: Vec<Url>,
  /// Allow the HTTPS -> HTTP redirect after a certificate error
  pub allow_insecure_downgrade: bool,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_path: "/manifest.json".to_string(),
      cross_origin_probe: Url::parse("https://8.8.8.8").ok(),
      fallback_origins: Vec::new(),
      allow_insecure_downgrade: false,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevConfig {
  /// Poll the worker script for changes and force-refresh clients
  pub enabled: bool,
  pub poll_interval_secs: u64,
  /// Path of the worker script whose digest is watched
  pub script_path: String,
  /// Activate a freshly installed worker without waiting for clients to close
  pub auto_skip_waiting: bool,
}

impl Default for DevConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      poll_interval_secs: 30,
      script_path: "/sw.js".to_string(),
      auto_skip_waiting: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false, nothing is persisted and every lookup misses
  pub enabled: bool,
  /// Override for the SQLite database location
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

fn default_version() -> String {
  "2.1".to_string()
}

fn default_cache_prefix() -> String {
  "comunicaciones-internas".to_string()
}

fn default_essential_files() -> Vec<String> {
  [
    "/",
    "/index.html",
    "/safari-inicio.html",
    "/safari-test.html",
    "/login.html",
    "/manifest.json",
    "/css/styles.css",
    "/js/app.js",
    "/js/auth.js",
    "/img/app-icon.svg",
    "/safari-config.js",
    "/safari-fallback.js",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

fn default_optional_files() -> Vec<String> {
  ["/css/login.css", "/js/utils.js", "/favicon.ico"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
  /// Build a configuration with defaults for everything except the origin.
  pub fn for_origin(origin: Url) -> Self {
    Self {
      origin,
      version: default_version(),
      cache_prefix: default_cache_prefix(),
      essential_files: default_essential_files(),
      optional_files: default_optional_files(),
      timeouts: TimeoutsConfig::default(),
      retry: RetryConfig::default(),
      connectivity: ConnectivityConfig::default(),
      dev: DevConfig::default(),
      cache: CacheConfig::default(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  ///
  /// When no file exists but `origin_override` is given, defaults are used.
  pub fn load(explicit_path: Option<&Path>, origin_override: Option<Url>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match (path, origin_override) {
      (Some(p), origin) => {
        let mut config = Self::load_from_path(&p)?;
        if let Some(origin) = origin {
          config.origin = origin;
        }
        config
      }
      (None, Some(origin)) => Self::for_origin(origin),
      (None, None) => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/swcache/config.yaml\n\
                 or pass --origin."
        ))
      }
    };

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if !matches!(self.origin.scheme(), "http" | "https") {
      return Err(eyre!(
        "Origin must use http or https, got {}",
        self.origin.scheme()
      ));
    }
    if self.retry.max_attempts == 0 {
      return Err(eyre!("retry.max_attempts must be at least 1"));
    }
    if let Some(bad) = self
      .essential_files
      .iter()
      .chain(&self.optional_files)
      .find(|f| !f.starts_with('/'))
    {
      return Err(eyre!("Install file paths must be absolute: {}", bad));
    }
    Ok(())
  }

  /// Partition names that survive activation for this version.
  pub fn static_partition(&self) -> String {
    format!("static-v{}", self.version)
  }

  pub fn dynamic_partition(&self) -> String {
    format!("dynamic-v{}", self.version)
  }

  pub fn shell_partition(&self) -> String {
    format!("{}-v{}", self.cache_prefix, self.version)
  }

  /// Alternate origins to probe, in order. Derived from the configured origin
  /// when none are listed: the origin itself, its https twin, then the two
  /// development ports.
  pub fn fallback_origins(&self) -> Vec<Url> {
    if !self.connectivity.fallback_origins.is_empty() {
      return self.connectivity.fallback_origins.clone();
    }

    let mut origins = vec![origin_of(&self.origin)];
    if let Some(host) = self.origin.host_str() {
      let candidates = [
        format!("https://{}", host),
        format!("http://{}:8080", host),
        format!("http://{}:3000", host),
      ];
      origins.extend(candidates.iter().filter_map(|c| Url::parse(c).ok()));
    }
    origins
  }

  /// Default location of the durable cache database.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache.path {
      return Ok(path.clone());
    }
    Ok(data_dir()?.join("cache.db"))
  }
}

/// Application data directory (`$XDG_DATA_HOME/swcache`).
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("swcache"))
}

/// Strip path, query and fragment, leaving `scheme://host[:port]/`.
pub fn origin_of(url: &Url) -> Url {
  let mut origin = url.clone();
  origin.set_path("/");
  origin.set_query(None);
  origin.set_fragment(None);
  origin
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_yaml_uses_defaults() {
    let config = Config::from_yaml("origin: https://intranet.example").unwrap();
    assert_eq!(config.version, "2.1");
    assert_eq!(config.timeouts.navigation(), Duration::from_secs(5));
    assert_eq!(config.timeouts.static_assets(), Duration::from_secs(3));
    assert_eq!(config.timeouts.dynamic(), Duration::from_secs(8));
    assert_eq!(config.retry.max_attempts, 3);
    assert!(!config.connectivity.allow_insecure_downgrade);
    assert!(config.essential_files.contains(&"/login.html".to_string()));
  }

  #[test]
  fn test_partition_names_carry_version() {
    let config = Config::from_yaml("origin: https://intranet.example\nversion: '3.0'").unwrap();
    assert_eq!(config.static_partition(), "static-v3.0");
    assert_eq!(config.dynamic_partition(), "dynamic-v3.0");
    assert_eq!(config.shell_partition(), "comunicaciones-internas-v3.0");
  }

  #[test]
  fn test_fallback_origins_derived_from_origin() {
    let config = Config::for_origin(Url::parse("https://intranet.example:8443/app").unwrap());
    let origins: Vec<String> = config
      .fallback_origins()
      .iter()
      .map(|u| u.to_string())
      .collect();
    assert_eq!(
      origins,
      vec![
        "https://intranet.example:8443/",
        "https://intranet.example/",
        "http://intranet.example:8080/",
        "http://intranet.example:3000/",
      ]
    );
  }

  #[test]
  fn test_explicit_fallback_origins_win() {
    let yaml =
      "origin: https://a.example\nconnectivity:\n  fallback_origins: ['https://b.example']";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.fallback_origins().len(), 1);
    assert_eq!(config.fallback_origins()[0].host_str(), Some("b.example"));
  }

  #[test]
  fn test_validate_rejects_relative_install_paths() {
    let yaml = "origin: https://a.example\nessential_files: ['index.html']";
    let config = Config::from_yaml(yaml).unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_validate_rejects_non_http_origin() {
    let config = Config::for_origin(Url::parse("ftp://a.example").unwrap());
    assert!(config.validate().is_err());
  }
}
