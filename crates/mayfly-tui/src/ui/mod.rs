//! TUI layout compositing — assembles all UI panels.

mod chat;
mod home;
mod input;
mod status;

use ratatui::prelude::*;

use crate::app::{App, Screen};

/// Render the full TUI layout.
pub fn draw(frame: &mut Frame, app: &App) {
    match &app.screen {
        Screen::Home { error } => home::draw(frame, app, error.as_deref()),
        Screen::Chat(view) => {
            // ┌──────────────────────────────────┐
            // │ Chat feed                        │
            // │                                  │
            // ├──────────────────────────────────┤
            // │ Status line + countdown gauge    │
            // ├──────────────────────────────────┤
            // │ Input                            │
            // └──────────────────────────────────┘

            let main_layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Min(10),   // feed
                    Constraint::Length(2), // status + gauge
                    Constraint::Length(3), // input
                ])
                .split(frame.area());

            chat::draw(frame, view, main_layout[0]);
            status::draw(frame, view, main_layout[1]);
            input::draw(frame, app, view, main_layout[2]);
        }
    }
}
