use crate::cache::{CacheStore, PartitionInfo};
use crate::connectivity::{
  ConnectivityEngine, ConnectivitySettings, ConnectivityState, Notice, NoticeLevel, Page,
  PageAction, TransportClassifier, NOTICE_TTL,
};
use crate::event::{Event, EventHandler, PageEvent};
use crate::net::Network;
use crate::ui;
use crate::worker::{ClientId, ClientNotice, Lifecycle, ServiceWorker};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::future::Future;
use std::io::stdout;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

/// Page backed by the monitor: every request becomes an event on the loop.
pub struct MonitorPage {
  tx: mpsc::UnboundedSender<Event>,
  url: Mutex<Url>,
}

impl MonitorPage {
  pub fn new(tx: mpsc::UnboundedSender<Event>, url: Url) -> Self {
    Self {
      tx,
      url: Mutex::new(url),
    }
  }

  pub fn set_url(&self, url: Url) {
    *self.url.lock().unwrap_or_else(|e| e.into_inner()) = url;
  }

  fn send(&self, event: PageEvent) {
    // The loop is gone only while shutting down
    let _ = self.tx.send(Event::Page(event));
  }
}

impl Page for MonitorPage {
  fn notify(&self, notice: Notice) {
    self.send(PageEvent::Notice(notice));
  }

  fn set_offline(&self, offline: bool) {
    self.send(PageEvent::Offline(offline));
  }

  fn schedule(&self, action: PageAction, delay: Duration) {
    self.send(PageEvent::Schedule(action, delay));
  }

  fn current_url(&self) -> Url {
    self.url.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

#[derive(Debug, Clone)]
pub struct ShownNotice {
  pub notice: Notice,
  expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ScheduledAction {
  pub action: PageAction,
  pub due: Instant,
}

/// Everything the monitor shows, independent of the terminal.
#[derive(Debug)]
pub struct MonitorState {
  notices: Vec<ShownNotice>,
  scheduled: Vec<ScheduledAction>,
  offline: bool,
  online: Option<bool>,
  connectivity: ConnectivityState,
  partitions: Vec<PartitionInfo>,
  lifecycle: Lifecycle,
  platform_online: Option<bool>,
}

impl MonitorState {
  pub fn new(lifecycle: Lifecycle) -> Self {
    Self {
      notices: Vec::new(),
      scheduled: Vec::new(),
      offline: false,
      online: None,
      connectivity: ConnectivityState::default(),
      partitions: Vec::new(),
      lifecycle,
      platform_online: None,
    }
  }

  pub fn push_notice(&mut self, notice: Notice, now: Instant) {
    self.notices.push(ShownNotice {
      notice,
      expires_at: now + NOTICE_TTL,
    });
  }

  pub fn apply_page_event(&mut self, event: PageEvent, now: Instant) {
    match event {
      PageEvent::Notice(notice) => self.push_notice(notice, now),
      PageEvent::Offline(offline) => self.offline = offline,
      PageEvent::Schedule(action, delay) => self.scheduled.push(ScheduledAction {
        action,
        due: now + delay,
      }),
    }
  }

  /// Drop expired notices and hand back the actions that are due.
  pub fn tick(&mut self, now: Instant) -> Vec<PageAction> {
    self.notices.retain(|n| n.expires_at > now);

    let (due, pending): (Vec<_>, Vec<_>) = self.scheduled.drain(..).partition(|s| s.due <= now);
    self.scheduled = pending;
    due.into_iter().map(|s| s.action).collect()
  }

  /// React to a worker message. A refresh request becomes a reload.
  pub fn apply_client_notice(&mut self, notice: ClientNotice, now: Instant) -> Option<PageAction> {
    match notice {
      ClientNotice::Controlled { version } => {
        self.lifecycle = Lifecycle::Active;
        self.push_notice(
          Notice::new(
            "Actualizado",
            &format!("Versión {} activa", version),
            NoticeLevel::Success,
          ),
          now,
        );
        None
      }
      ClientNotice::Navigate(_) => Some(PageAction::Reload),
    }
  }

  /// Record the platform online flag. Returns the new value only when it
  /// changed since the previous observation.
  pub fn observe_platform(&mut self, online: bool) -> Option<bool> {
    let previous = self.platform_online.replace(online);
    match previous {
      Some(before) if before != online => Some(online),
      _ => None,
    }
  }

  pub fn set_connectivity(&mut self, online: bool, state: ConnectivityState) {
    self.online = Some(online);
    self.connectivity = state;
  }

  pub fn set_partitions(&mut self, partitions: Vec<PartitionInfo>) {
    self.partitions = partitions;
  }

  pub fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
    self.lifecycle = lifecycle;
  }

  /// Controls that need the network are disabled in offline mode.
  pub fn network_controls_enabled(&self) -> bool {
    !self.offline
  }

  pub fn notices(&self) -> &[ShownNotice] {
    &self.notices
  }

  pub fn scheduled(&self) -> &[ScheduledAction] {
    &self.scheduled
  }

  pub fn offline(&self) -> bool {
    self.offline
  }

  pub fn online(&self) -> Option<bool> {
    self.online
  }

  pub fn connectivity(&self) -> &ConnectivityState {
    &self.connectivity
  }

  pub fn partitions(&self) -> &[PartitionInfo] {
    &self.partitions
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }
}

type Engine<N> = ConnectivityEngine<N, MonitorPage, TransportClassifier>;

/// Terminal monitor for the cache and connectivity state
pub struct App<S: CacheStore + 'static, N: Network> {
  state: MonitorState,
  engine: Arc<Engine<N>>,
  worker: Arc<tokio::sync::Mutex<ServiceWorker<S, N>>>,
  network: Arc<N>,
  client_id: ClientId,
  updates: Option<JoinHandle<()>>,
  origin: Url,
  version: String,
  events: EventHandler,
  should_quit: bool,
}

impl<S: CacheStore + 'static, N: Network> App<S, N> {
  pub fn new(worker: ServiceWorker<S, N>, settings: ConnectivitySettings, origin: Url) -> Self {
    let events = EventHandler::new(Duration::from_millis(250));
    let page = MonitorPage::new(events.sender(), origin.clone());
    let engine = ConnectivityEngine::with_classifier(
      worker.network().clone(),
      page,
      settings,
      TransportClassifier::default(),
    );

    // The monitor is one of the worker's pages
    let (client_id, mut notices) = worker.clients().connect(origin.clone());
    let tx = events.sender();
    tokio::spawn(async move {
      while let Some(notice) = notices.recv().await {
        if tx.send(Event::Client(notice)).is_err() {
          break;
        }
      }
    });

    Self {
      state: MonitorState::new(worker.lifecycle()),
      version: worker.version().to_string(),
      engine: Arc::new(engine),
      network: worker.network().clone(),
      worker: Arc::new(tokio::sync::Mutex::new(worker)),
      client_id,
      updates: None,
      origin,
      events,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    self.load_partitions();
    self.initial_check();
    self.start_update_watcher().await;

    // Main loop
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = self.events.next().await {
        self.handle_event(event);
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    if let Some(updates) = self.updates.take() {
      updates.abort();
    }
    let mut worker = self.worker.lock().await;
    if let Err(e) = worker.client_closed(self.client_id) {
      worker.report_error(&e);
    }

    Ok(())
  }

  /// Dev mode only: poll the worker script in the background.
  async fn start_update_watcher(&mut self) {
    let worker = self.worker.lock().await;
    let Some(watcher) = worker.update_watcher() else {
      return;
    };
    info!(script = %watcher.script_url(), "Polling worker script for updates");
    let handle = watcher.spawn(
      worker.network().clone(),
      worker.cache().clone(),
      worker.clients().clone(),
    );
    self.updates = Some(handle);
  }

  fn handle_event(&mut self, event: Event) {
    let now = Instant::now();
    match event {
      Event::Key(key) => self.handle_key(key, now),
      Event::Tick => {
        self.watch_platform();
        for action in self.state.tick(now) {
          self.perform(action);
        }
      }
      Event::Page(page_event) => self.state.apply_page_event(page_event, now),
      Event::Connectivity { online, state } => self.state.set_connectivity(online, state),
      Event::Partitions(partitions) => self.state.set_partitions(partitions),
      Event::Lifecycle(lifecycle) => self.state.set_lifecycle(lifecycle),
      Event::Client(notice) => {
        if let Some(action) = self.state.apply_client_notice(notice, now) {
          self.perform(action);
        }
      }
      Event::Error(msg) => {
        warn!(error = %msg, "Monitor task failed");
        self.state.push_notice(Notice::new("Error", &msg, NoticeLevel::Error), now);
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent, now: Instant) {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }
      KeyCode::Char('r') => self.retry_connection(),
      KeyCode::Char('c') => self.check(),
      KeyCode::Char('p') => self.load_partitions(),
      KeyCode::Char('i') => {
        if self.state.network_controls_enabled() {
          self.install();
        } else {
          self.state.push_notice(
            Notice::new("Modo Offline", "Requiere conexión a internet", NoticeLevel::Warning),
            now,
          );
        }
      }
      KeyCode::Char('a') => self.activate(),
      _ => {}
    }
  }

  /// Run a page action that came due.
  fn perform(&mut self, action: PageAction) {
    match action {
      PageAction::Reload => {
        info!("Reloading");
        self.check();
        self.load_partitions();
      }
      PageAction::Navigate(url) => {
        info!(url = %url, "Switching origin");
        self.origin = crate::config::origin_of(&url);
        self.engine.page().set_url(url);
        self.check();
      }
    }
  }

  /// Turn platform online/offline transitions into page events.
  fn watch_platform(&mut self) {
    let Some(online) = self.state.observe_platform(self.network.is_online()) else {
      return;
    };
    let engine = self.engine.clone();
    let tx = self.events.sender();

    self.spawn_page_task(async move {
      if online {
        engine.on_online().await;
      } else {
        engine.on_offline();
      }
      let _ = tx.send(Event::Connectivity {
        online,
        state: engine.state(),
      });
    });
  }

  /// Page-side task. A panic surfaces like an unhandled rejection.
  fn spawn_page_task<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let engine = self.engine.clone();
    let handle = tokio::spawn(task);
    tokio::spawn(async move {
      if let Err(e) = handle.await {
        engine.handle_rejection(&e.to_string()).await;
      }
    });
  }

  /// Worker-side task. A panic is reported to the worker and suppressed.
  fn spawn_worker_task<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let worker = self.worker.clone();
    let handle = tokio::spawn(task);
    tokio::spawn(async move {
      if let Err(e) = handle.await {
        worker.lock().await.report_rejection(&e.to_string());
      }
    });
  }

  fn initial_check(&self) {
    let engine = self.engine.clone();
    let tx = self.events.sender();

    self.spawn_page_task(async move {
      let online = engine.check_connectivity().await;
      if !online {
        engine.activate_offline_mode();
      }
      let _ = tx.send(Event::Connectivity {
        online,
        state: engine.state(),
      });
    });
  }

  fn check(&self) {
    let engine = self.engine.clone();
    let tx = self.events.sender();

    self.spawn_page_task(async move {
      let online = engine.check_connectivity().await;
      let _ = tx.send(Event::Connectivity {
        online,
        state: engine.state(),
      });
    });
  }

  fn retry_connection(&self) {
    let engine = self.engine.clone();
    let tx = self.events.sender();

    self.spawn_page_task(async move {
      let online = engine.check_connection().await;
      let _ = tx.send(Event::Connectivity {
        online,
        state: engine.state(),
      });
    });
  }

  fn load_partitions(&self) {
    let worker = self.worker.clone();
    let tx = self.events.sender();

    self.spawn_worker_task(async move {
      let worker = worker.lock().await;
      match worker.cache().partitions() {
        Ok(partitions) => {
          let _ = tx.send(Event::Partitions(partitions));
        }
        Err(e) => {
          worker.report_error(&e);
          let _ = tx.send(Event::Error(e.to_string()));
        }
      }
    });
  }

  fn install(&self) {
    let worker = self.worker.clone();
    let engine = self.engine.clone();
    let tx = self.events.sender();

    self.spawn_worker_task(async move {
      let mut worker = worker.lock().await;
      match worker.install().await {
        Ok(report) => {
          info!(cached = report.cached.len(), failed = report.failed.len(), "Install finished");
          if !report.failed.is_empty() {
            let _ = tx.send(Event::Error(format!(
              "{} files could not be cached",
              report.failed.len()
            )));
          }
        }
        Err(e) => {
          worker.report_error(&e);
          engine.handle_error(&e).await;
        }
      }
      let _ = tx.send(Event::Lifecycle(worker.lifecycle()));
      if let Ok(partitions) = worker.cache().partitions() {
        let _ = tx.send(Event::Partitions(partitions));
      }
    });
  }

  fn activate(&self) {
    let worker = self.worker.clone();
    let tx = self.events.sender();

    self.spawn_worker_task(async move {
      let mut worker = worker.lock().await;
      if let Err(e) = worker.activate() {
        worker.report_error(&e);
        let _ = tx.send(Event::Error(e.to_string()));
      }
      let _ = tx.send(Event::Lifecycle(worker.lifecycle()));
      if let Ok(partitions) = worker.cache().partitions() {
        let _ = tx.send(Event::Partitions(partitions));
      }
    });
  }

  // Accessors for UI rendering
  pub fn state(&self) -> &MonitorState {
    &self.state
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  pub fn version(&self) -> &str {
    &self.version
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn notice(title: &str) -> Notice {
    Notice::new(title, "", NoticeLevel::Info)
  }

  #[test]
  fn test_notices_expire_after_five_seconds() {
    let start = Instant::now();
    let mut state = MonitorState::new(Lifecycle::Active);
    state.apply_page_event(PageEvent::Notice(notice("Verificando")), start);

    state.tick(start + Duration::from_secs(4));
    assert_eq!(state.notices().len(), 1);
    state.tick(start + Duration::from_secs(5));
    assert!(state.notices().is_empty());
  }

  #[test]
  fn test_scheduled_actions_fire_once_when_due() {
    let start = Instant::now();
    let mut state = MonitorState::new(Lifecycle::Active);
    let target = Url::parse("http://a.example:8080/inbox").unwrap();
    state.apply_page_event(PageEvent::Schedule(PageAction::Reload, Duration::from_secs(3)), start);
    state.apply_page_event(
      PageEvent::Schedule(PageAction::Navigate(target.clone()), Duration::from_secs(2)),
      start,
    );

    assert!(state.tick(start + Duration::from_secs(1)).is_empty());
    assert_eq!(
      state.tick(start + Duration::from_secs(2)),
      vec![PageAction::Navigate(target)]
    );
    assert_eq!(state.tick(start + Duration::from_secs(3)), vec![PageAction::Reload]);
    assert!(state.tick(start + Duration::from_secs(10)).is_empty());
    assert!(state.scheduled().is_empty());
  }

  #[test]
  fn test_offline_mode_disables_network_controls() {
    let mut state = MonitorState::new(Lifecycle::Parsed);
    assert!(state.network_controls_enabled());
    state.apply_page_event(PageEvent::Offline(true), Instant::now());
    assert!(state.offline());
    assert!(!state.network_controls_enabled());
    state.apply_page_event(PageEvent::Offline(false), Instant::now());
    assert!(state.network_controls_enabled());
  }

  #[test]
  fn test_worker_messages_update_the_monitor() {
    let now = Instant::now();
    let mut state = MonitorState::new(Lifecycle::Waiting);

    let controlled = ClientNotice::Controlled {
      version: "2.1".to_string(),
    };
    assert_eq!(state.apply_client_notice(controlled, now), None);
    assert_eq!(state.lifecycle(), Lifecycle::Active);
    assert_eq!(state.notices()[0].notice.title, "Actualizado");

    let refresh = ClientNotice::Navigate(Url::parse("https://a.example/").unwrap());
    assert_eq!(state.apply_client_notice(refresh, now), Some(PageAction::Reload));
  }

  #[test]
  fn test_platform_transitions_are_reported_once() {
    let mut state = MonitorState::new(Lifecycle::Active);
    assert_eq!(state.observe_platform(true), None);
    assert_eq!(state.observe_platform(true), None);
    assert_eq!(state.observe_platform(false), Some(false));
    assert_eq!(state.observe_platform(false), None);
    assert_eq!(state.observe_platform(true), Some(true));
  }

  #[tokio::test]
  async fn test_monitor_page_forwards_to_the_loop() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let page = MonitorPage::new(tx, Url::parse("https://a.example/inbox").unwrap());

    page.set_offline(true);
    page.schedule(PageAction::Reload, Duration::from_secs(2));
    page.set_url(Url::parse("http://a.example:8080/inbox").unwrap());

    assert!(matches!(rx.recv().await, Some(Event::Page(PageEvent::Offline(true)))));
    assert!(matches!(
      rx.recv().await,
      Some(Event::Page(PageEvent::Schedule(PageAction::Reload, _)))
    ));
    assert_eq!(page.current_url().port(), Some(8080));
  }
}
