use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use url::Url;

use crate::worker::Lifecycle;

/// Draw the header bar with name, origin, version and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  origin: &Url,
  version: &str,
  lifecycle: Lifecycle,
) {
  let header = Line::from(vec![
    Span::styled(" swcache ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", host_label(origin)), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" v{} ", version), Style::default().fg(Color::Yellow).bold()),
    Span::styled(
      format!("{:?} ", lifecycle).to_lowercase(),
      Style::default().fg(lifecycle_color(lifecycle)),
    ),
    Span::raw("  "),
    // Shortcuts - keys and brackets highlighted, descriptions dimmed
    Span::styled("<r>", Style::default().fg(Color::Cyan)),
    Span::styled(" retry", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<c>", Style::default().fg(Color::Cyan)),
    Span::styled(" check", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<i>", Style::default().fg(Color::Cyan)),
    Span::styled(" install", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<a>", Style::default().fg(Color::Cyan)),
    Span::styled(" activate", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<q>", Style::default().fg(Color::Cyan)),
    Span::styled(" quit", Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Host plus port when it is not the scheme default
fn host_label(origin: &Url) -> String {
  let host = origin.host_str().unwrap_or("?");
  match origin.port() {
    Some(port) => format!("{}:{}", host, port),
    None => host.to_string(),
  }
}

fn lifecycle_color(lifecycle: Lifecycle) -> Color {
  match lifecycle {
    Lifecycle::Active => Color::Green,
    Lifecycle::Waiting => Color::Yellow,
    Lifecycle::Parsed => Color::DarkGray,
  }
}
