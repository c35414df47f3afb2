use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::PartitionInfo;
use crate::connectivity::{ConnectivityState, Notice, PageAction};
use crate::worker::{ClientNotice, Lifecycle};

/// What the connectivity engine asked the page to do
#[derive(Debug)]
pub enum PageEvent {
  Notice(Notice),
  Offline(bool),
  Schedule(PageAction, Duration),
}

/// Monitor events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for notice expiry and scheduled actions
  Tick,
  Page(PageEvent),
  /// Result of a connectivity probe, with the engine state afterwards
  Connectivity {
    online: bool,
    state: ConnectivityState,
  },
  Partitions(Vec<PartitionInfo>),
  Lifecycle(Lifecycle),
  /// Message from the worker to this page
  Client(ClientNotice),
  Error(String),
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let input_tx = tx.clone();
    tokio::spawn(async move {
      loop {
        // crossterm polling blocks; keep it off the async workers
        let polled = tokio::task::spawn_blocking(move || {
          if event::poll(tick_rate).unwrap_or(false) {
            event::read().ok()
          } else {
            None
          }
        })
        .await;

        let event = match polled {
          Ok(Some(CrosstermEvent::Key(key))) => Event::Key(key),
          Ok(Some(_)) => continue,
          Ok(None) => Event::Tick,
          Err(_) => break,
        };
        if input_tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks to report back on
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
