use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::time::Instant;

use crate::app::MonitorState;
use crate::connectivity::PageAction;

/// Connectivity and remediation state
pub fn draw_status(frame: &mut Frame, area: Rect, state: &MonitorState) {
  let connectivity = state.connectivity();

  let (reach, reach_color) = match state.online() {
    None => ("checking...", Color::DarkGray),
    Some(true) => ("online", Color::Green),
    Some(false) => ("unreachable", Color::Red),
  };

  let mut lines = vec![
    field("Reachability", Span::styled(reach, Style::default().fg(reach_color))),
    field("Offline mode", flag(connectivity.is_offline(), "on", "off")),
    field("Certificate", flag(connectivity.certificate_error(), "error", "ok")),
    field("Retries", Span::raw(connectivity.current_retry().to_string())),
    field(
      "Last error",
      Span::styled(
        connectivity.last_error().unwrap_or("-").to_string(),
        Style::default().fg(Color::DarkGray),
      ),
    ),
  ];

  if !state.scheduled().is_empty() {
    lines.push(Line::raw(""));
    lines.push(Line::styled("Scheduled", Style::default().fg(Color::Cyan).bold()));
    let now = Instant::now();
    for scheduled in state.scheduled() {
      let remaining = scheduled.due.saturating_duration_since(now).as_secs_f32();
      let label = match &scheduled.action {
        PageAction::Reload => "reload".to_string(),
        PageAction::Navigate(url) => format!("go to {}", url),
      };
      lines.push(Line::raw(format!("  {} in {:.1}s", label, remaining)));
    }
  }

  let block = Block::default()
    .title(" Connectivity ")
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
  frame.render_widget(paragraph, area);
}

fn field<'a>(label: &'a str, value: Span<'a>) -> Line<'a> {
  Line::from(vec![
    Span::styled(format!("{:<14}", label), Style::default().fg(Color::Yellow)),
    value,
  ])
}

fn flag(set: bool, yes: &'static str, no: &'static str) -> Span<'static> {
  if set {
    Span::styled(yes, Style::default().fg(Color::Red).bold())
  } else {
    Span::styled(no, Style::default().fg(Color::Green))
  }
}
