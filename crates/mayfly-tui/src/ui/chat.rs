//! Scrollable chat feed — own messages right, the peer's left, notices centered.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use mayfly_core::types::Sender;

use crate::app::SessionView;

pub fn draw(frame: &mut Frame, view: &SessionView, area: Rect) {
    let block = Block::default()
        .title(format!(" {} ", view.code))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if view.messages.is_empty() {
        let empty =
            Paragraph::new("Waiting for messages...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    // Build display lines from messages (bottom-up with scroll offset)
    let visible_height = inner.height as usize;
    let total = view.messages.len();
    let end = total.saturating_sub(view.scroll_offset);
    let start = end.saturating_sub(visible_height * 2); // overshoot for wrapping

    let mut lines: Vec<Line> = Vec::new();
    for msg in &view.messages[start..end] {
        // Truncate long messages for display
        let display: String = msg.text.chars().take(500).collect();
        for text in display.lines() {
            let line = match msg.sender {
                Sender::User => {
                    Line::styled(text.to_string(), Style::default().fg(Color::Cyan))
                        .alignment(Alignment::Right)
                }
                Sender::Peer => {
                    Line::styled(text.to_string(), Style::default().fg(Color::Green))
                }
                Sender::System => {
                    Line::styled(text.to_string(), Style::default().fg(Color::DarkGray).italic())
                        .alignment(Alignment::Center)
                }
            };
            lines.push(line);
        }
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner);
}
