use ratatui::prelude::Color;

use crate::connectivity::NoticeLevel;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Background color for a notice
pub fn level_color(level: NoticeLevel) -> Color {
  match level {
    NoticeLevel::Info => Color::Blue,
    NoticeLevel::Warning => Color::Yellow,
    NoticeLevel::Error => Color::Red,
    NoticeLevel::Success => Color::Green,
  }
}
