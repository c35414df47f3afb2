use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};

use crate::cache::PartitionInfo;
use crate::ui::renderfns::utils::truncate;

/// Cache partitions with their entry counts
pub fn draw_partitions(frame: &mut Frame, area: Rect, partitions: &[PartitionInfo]) {
  let block = Block::default()
    .title(format!(" Partitions ({}) ", partitions.len()))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if partitions.is_empty() {
    let paragraph = Paragraph::new("No partitions. Press 'i' to install.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let name_width = area.width.saturating_sub(30).max(12) as usize;
  let items: Vec<ListItem> = partitions
    .iter()
    .map(|p| {
      let line = Line::from(vec![
        Span::styled(
          format!("{:<width$}", truncate(&p.name, name_width), width = name_width),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::styled(
          format!("{:<8}", p.purpose.as_str()),
          Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!("{:>5} ", p.entries)),
        Span::styled(
          p.created_at.format("%Y-%m-%d").to_string(),
          Style::default().fg(Color::DarkGray),
        ),
      ]);
      ListItem::new(line)
    })
    .collect();

  frame.render_widget(List::new(items).block(block), area);
}
