mod app;
mod cache;
mod commands;
mod config;
mod connectivity;
mod event;
mod logging;
mod net;
mod ui;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use url::Url;

use crate::cache::{NoopStore, SqliteStore};
use crate::commands::Command;
use crate::logging::Verbosity;

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline caching shell for the internal communications app")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./swcache.yaml, then $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin of the app, overriding the config file
  #[arg(short, long, global = true)]
  origin: Option<Url>,

  /// Debug-level logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Errors only
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let verbosity = Verbosity::from_flags(args.verbose, args.quiet);

  // The monitor owns the terminal, so its logs go to a file
  let _guard = match args.command {
    Command::Monitor => Some(logging::init_file(verbosity, &config::data_dir()?.join("logs"))?),
    _ => {
      logging::init_stderr(verbosity)?;
      None
    }
  };

  // Load configuration
  let config = config::Config::load(args.config.as_deref(), args.origin)?;

  if config.cache.enabled {
    let store = SqliteStore::open(&config.database_path()?)?;
    commands::run(args.command, config, store).await
  } else {
    commands::run(args.command, config, NoopStore).await
  }
}
