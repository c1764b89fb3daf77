//! Home screen — create a session or join one by code.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App, error: Option<&str>) {
    let area = frame.area();
    let card = centered_rect(56, 11, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(2), // tagline
            Constraint::Length(1), // spacer
            Constraint::Length(3), // code input
            Constraint::Length(1), // error
            Constraint::Length(1), // spacer
            Constraint::Length(2), // key hints
        ])
        .split(card);

    let title = Paragraph::new(Line::styled(
        "mayfly",
        Style::default().fg(Color::Cyan).bold(),
    ))
    .alignment(Alignment::Center);
    frame.render_widget(title, rows[0]);

    let tagline = Paragraph::new(Line::styled(
        "Ephemeral chat for temporary, private conversations.",
        Style::default().fg(Color::DarkGray),
    ))
    .alignment(Alignment::Center);
    frame.render_widget(tagline, rows[1]);

    let input_block = Block::default()
        .title(" Connection code ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = input_block.inner(rows[3]);
    frame.render_widget(input_block, rows[3]);

    let input = Paragraph::new(app.input.as_str()).style(Style::default().fg(Color::White));
    frame.render_widget(input, inner);
    frame.set_cursor_position(Position::new(inner.x + app.input.len() as u16, inner.y));

    if let Some(error) = error {
        let error_line = Paragraph::new(Line::styled(error, Style::default().fg(Color::Red)))
            .alignment(Alignment::Center);
        frame.render_widget(error_line, rows[4]);
    }

    let hints = Paragraph::new(vec![
        Line::styled(
            "Enter to join the code above",
            Style::default().fg(Color::DarkGray),
        ),
        Line::styled(
            "Ctrl+N for a new session, Ctrl+Q to quit",
            Style::default().fg(Color::DarkGray),
        ),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(hints, rows[6]);
}

/// A `width` x `height` rect centered in `area`, shrunk to fit.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}
