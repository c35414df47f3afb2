use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use super::utils::{level_color, truncate};
use crate::app::ShownNotice;

/// Persistent offline indicator with the retry hint
pub fn draw_offline_banner(frame: &mut Frame, area: Rect) {
  let line = Line::from(vec![
    Span::styled(" Sin conexión - Modo offline activo ", Style::default().bold()),
    Span::styled("  <r> Reintentar", Style::default().fg(Color::White)),
  ]);
  let paragraph = Paragraph::new(line)
    .alignment(Alignment::Center)
    .style(Style::default().bg(Color::LightRed).fg(Color::White));
  frame.render_widget(paragraph, area);
}

/// Transient notices, newest last
pub fn draw_notices(frame: &mut Frame, area: Rect, notices: &[ShownNotice]) {
  let width = area.width.saturating_sub(4) as usize;
  let lines: Vec<Line> = notices
    .iter()
    .map(|shown| {
      let n = &shown.notice;
      Line::from(vec![
        Span::styled(
          format!(" {} ", n.title),
          Style::default().bg(level_color(n.level)).fg(Color::Black).bold(),
        ),
        Span::raw(" "),
        Span::raw(truncate(&n.message, width.saturating_sub(n.title.len() + 3))),
      ])
    })
    .collect();

  let block = Block::default()
    .title(" Notices ")
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));
  frame.render_widget(Paragraph::new(lines).block(block), area);
}
