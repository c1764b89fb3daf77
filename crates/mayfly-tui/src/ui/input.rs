//! Text input bar — locked while a send is in flight and once expired.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use mayfly_core::types::SessionPhase;

use crate::app::{App, SessionView};

pub fn draw(frame: &mut Frame, app: &App, view: &SessionView, area: Rect) {
    let (title, border_color) = if view.phase == SessionPhase::Expired {
        (" Session expired ", Color::DarkGray)
    } else if view.sending {
        (" Sending... ", Color::Yellow)
    } else {
        (" Message (Enter to send, Esc to leave) ", Color::Cyan)
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let input = Paragraph::new(app.input.as_str()).style(Style::default().fg(Color::White));
    frame.render_widget(input, inner);

    // Show cursor only while composing is possible
    if view.phase == SessionPhase::Active && !view.sending {
        frame.set_cursor_position(Position::new(inner.x + app.input.len() as u16, inner.y));
    }
}
