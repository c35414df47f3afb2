//! Command-line subcommands.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::app::App;
use crate::cache::{CacheManager, CacheStore, PartitionSet, Served};
use crate::config::Config;
use crate::connectivity::{
  ConnectivityEngine, ConnectivitySettings, Notice, Page, PageAction, TransportClassifier,
};
use crate::net::{HttpNetwork, Network, RequestInfo};
use crate::worker::{ServiceWorker, UpdateCheck, WorkerSettings};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Install the current version: pre-cache the install files
  Install,
  /// Activate the installed version and purge older partitions
  Activate,
  /// Fetch a URL through the worker
  Fetch {
    /// Absolute URL, or a path on the configured origin
    url: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// Delete partitions that do not belong to the current version
  Purge {
    /// Delete every partition, current ones included
    #[arg(long)]
    all: bool,
  },
  /// List cache partitions
  Partitions,
  /// Probe connectivity and print the resulting state
  Check,
  /// Post a control message to the worker, e.g. '{"type":"GET_VERSION"}'
  Message { json: String },
  /// Simulate a push with an optional JSON payload
  Push { json: Option<String> },
  /// Poll the worker script and purge caches when it changes (dev mode only)
  Watch {
    /// Seconds between polls (default: dev.poll_interval_secs)
    #[arg(long)]
    interval: Option<u64>,
  },
  /// Terminal monitor for connectivity and cache state
  Monitor,
}

/// Run one subcommand against the given store.
pub async fn run<S: CacheStore + 'static>(
  command: Command,
  config: Config,
  store: S,
) -> Result<()> {
  let network = Arc::new(HttpNetwork::new()?);
  let cache = CacheManager::new(store, PartitionSet::from_config(&config));
  let mut worker = ServiceWorker::new(cache, network.clone(), WorkerSettings::from_config(&config));
  let restored = worker.restore()?;

  match command {
    Command::Install => {
      let report = worker.install().await?;
      println!(
        "Installed v{}: {} cached, {} failed ({:?})",
        worker.version(),
        report.cached.len(),
        report.failed.len(),
        worker.lifecycle()
      );
      for (file, error) in &report.failed {
        println!("  {}  {}", file, error);
      }
    }
    Command::Activate => {
      let purged = worker.activate()?;
      println!("Activated v{}", worker.version());
      for name in purged {
        println!("  purged {}", name);
      }
    }
    Command::Fetch {
      url,
      navigate,
      method,
    } => {
      let request = build_request(&config.origin, &url, navigate, &method)?;
      if !restored {
        warn!("Worker is not active; run `swcache install` first. Passing through to the network.");
      }
      let served = match worker.handle_fetch(&request).await {
        Some(served) => served,
        None => {
          // Nothing intercepted it: a plain page fetch, retried and remediated
          let engine = console_engine(network.clone(), &config);
          match engine.retry(|| network.fetch(&request)).await {
            Ok(snapshot) => Served::from_network(snapshot),
            Err(e) => {
              engine.handle_error(&e).await;
              return Err(e);
            }
          }
        }
      };
      print_served(&served)?;
    }
    Command::Purge { all } => {
      let purged = if all {
        worker.cache().purge_all()?
      } else {
        worker.cache().purge_stale(&worker.cache().partition_set().names())?
      };
      if purged.is_empty() {
        println!("Nothing to purge");
      }
      for name in purged {
        println!("purged {}", name);
      }
    }
    Command::Partitions => {
      for p in worker.cache().partitions()? {
        println!(
          "{:<32} {:<8} {:>6}  {}",
          p.name,
          p.purpose.as_str(),
          p.entries,
          p.created_at.format("%Y-%m-%d %H:%M:%S")
        );
      }
    }
    Command::Check => {
      let engine = console_engine(network.clone(), &config);
      let online = engine.check_connectivity().await;
      if !online {
        engine.activate_offline_mode();
      }
      println!("online: {}", online);
      println!(
        "{}",
        serde_json::to_string_pretty(&engine.state())
          .map_err(|e| eyre!("Failed to encode state: {}", e))?
      );
    }
    Command::Message { json } => {
      if let Some(reply) = worker.handle_message(&json)? {
        println!(
          "{}",
          serde_json::to_string(&reply).map_err(|e| eyre!("Failed to encode reply: {}", e))?
        );
      }
    }
    Command::Push { json } => {
      let notification = worker.handle_push(json.as_deref().map(str::as_bytes));
      println!(
        "{}",
        serde_json::to_string_pretty(&notification)
          .map_err(|e| eyre!("Failed to encode notification: {}", e))?
      );
      println!("opens {}", notification.target(&config.origin));
    }
    Command::Watch { interval } => watch(&worker, interval).await?,
    Command::Monitor => {
      let settings = ConnectivitySettings::from_config(&config);
      let mut app = App::new(worker, settings, config.origin.clone());
      app.run().await?;
    }
  }

  Ok(())
}

fn console_engine<N: Network>(
  network: Arc<N>,
  config: &Config,
) -> ConnectivityEngine<N, ConsolePage, TransportClassifier> {
  ConnectivityEngine::with_classifier(
    network,
    ConsolePage::new(config.origin.clone()),
    ConnectivitySettings::from_config(config),
    TransportClassifier::default(),
  )
}

/// Resolve `raw` against the origin and wrap it as a request.
fn build_request(origin: &Url, raw: &str, navigate: bool, method: &str) -> Result<RequestInfo> {
  let url = origin
    .join(raw)
    .map_err(|e| eyre!("Invalid URL {}: {}", raw, e))?;
  let method = Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;

  let request = if navigate {
    RequestInfo::navigate(url)
  } else {
    RequestInfo::get(url)
  };
  Ok(request.with_method(method))
}

fn print_served(served: &Served) -> Result<()> {
  eprintln!(
    "{} {} ({})",
    served.snapshot.status,
    served.snapshot.content_type().unwrap_or("-"),
    served.source.label()
  );
  std::io::stdout()
    .write_all(&served.snapshot.body)
    .map_err(|e| eyre!("Failed to write body: {}", e))
}

async fn watch<S: CacheStore + 'static, N: Network>(
  worker: &ServiceWorker<S, N>,
  interval: Option<u64>,
) -> Result<()> {
  let Some(mut watcher) = worker.update_watcher() else {
    return Err(eyre!(
      "Update polling is a development feature; set dev.enabled: true in the config"
    ));
  };
  if let Some(secs) = interval {
    watcher = watcher.with_interval(Duration::from_secs(secs.max(1)));
  }
  let script_url = watcher.script_url().clone();
  info!(script = %script_url, secs = watcher.interval().as_secs(), "Watching worker script");

  let mut ticker = tokio::time::interval(watcher.interval());
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => return Ok(()),
      _ = ticker.tick() => {
        let network = worker.network().as_ref();
        match watcher.check_once(network, worker.cache(), worker.clients()).await {
          Ok(UpdateCheck::Changed { purged, .. }) => {
            println!("{} changed; purged {}", script_url, purged.join(", "));
          }
          Ok(_) => {}
          Err(e) => warn!(error = %e, "Update check failed"),
        }
      }
    }
  }
}

/// Page for one-shot commands: notices are printed, nothing is scheduled.
struct ConsolePage {
  url: Url,
}

impl ConsolePage {
  fn new(url: Url) -> Self {
    Self { url }
  }
}

impl Page for ConsolePage {
  fn notify(&self, notice: Notice) {
    eprintln!("[{:?}] {}: {}", notice.level, notice.title, notice.message);
  }

  fn set_offline(&self, offline: bool) {
    info!(offline, "Offline mode changed");
  }

  fn schedule(&self, action: PageAction, delay: Duration) {
    info!(?action, ms = delay.as_millis() as u64, "Not scheduling page action in one-shot mode");
  }

  fn current_url(&self) -> Url {
    self.url.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::RequestMode;

  fn origin() -> Url {
    Url::parse("https://a.example/").unwrap()
  }

  #[test]
  fn test_build_request_resolves_paths() {
    let request = build_request(&origin(), "/inbox?page=2", true, "get").unwrap();
    assert_eq!(request.url.as_str(), "https://a.example/inbox?page=2");
    assert_eq!(request.mode, RequestMode::Navigate);
    assert_eq!(request.method, Method::GET);
  }

  #[test]
  fn test_build_request_keeps_absolute_urls() {
    let request = build_request(&origin(), "https://cdn.example/x.css", false, "HEAD").unwrap();
    assert_eq!(request.url.host_str(), Some("cdn.example"));
    assert_eq!(request.method, Method::HEAD);
  }

  #[test]
  fn test_build_request_rejects_bad_method() {
    assert!(build_request(&origin(), "/", false, "NOT A METHOD").is_err());
  }
}
