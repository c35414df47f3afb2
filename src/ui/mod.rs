mod renderfns;
mod views;

use crate::app::App;
use crate::cache::CacheStore;
use crate::net::Network;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw<S: CacheStore + 'static, N: Network>(frame: &mut Frame, app: &App<S, N>) {
  let state = app.state();
  let banner_height = if state.offline() { 1 } else { 0 };
  let notices_height = if state.notices().is_empty() {
    0
  } else {
    state.notices().len() as u16 + 2
  };

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1),              // Header
      Constraint::Length(banner_height),  // Offline banner
      Constraint::Min(3),                 // Main content
      Constraint::Length(notices_height), // Notices
      Constraint::Length(1),              // Status bar
    ])
    .split(frame.area());

  renderfns::draw_header(frame, chunks[0], app.origin(), app.version(), state.lifecycle());
  if state.offline() {
    renderfns::draw_offline_banner(frame, chunks[1]);
  }

  let body = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
    .split(chunks[2]);
  views::draw_status(frame, body[0], state);
  views::draw_partitions(frame, body[1], state.partitions());

  if !state.notices().is_empty() {
    renderfns::draw_notices(frame, chunks[3], state.notices());
  }

  draw_status_bar(frame, chunks[4], state.network_controls_enabled());
}

fn draw_status_bar(frame: &mut Frame, area: Rect, network_controls: bool) {
  let (content, style) = if network_controls {
    (
      " r:retry  c:check  p:partitions  i:install  a:activate  q:quit",
      Style::default().fg(Color::DarkGray),
    )
  } else {
    (
      " r:retry  c:check  p:partitions  i:install (requiere conexión)  a:activate  q:quit",
      Style::default().fg(Color::Yellow),
    )
  };

  frame.render_widget(Paragraph::new(content).style(style), area);
}
