//! Status bar — countdown readout and the draining session gauge.

use ratatui::prelude::*;
use ratatui::widgets::{Gauge, Paragraph};

use mayfly_core::types::SessionPhase;

use crate::app::SessionView;

pub fn draw(frame: &mut Frame, view: &SessionView, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    if view.phase == SessionPhase::Expired {
        let banner = Paragraph::new(Line::styled(
            " Session expired. This chat has been automatically deleted. Press Esc to start a new one. ",
            Style::default().fg(Color::Black).bg(Color::Red),
        ));
        frame.render_widget(banner, rows[0]);
        return;
    }

    let mut spans = vec![
        Span::styled(
            format!(" {} ", view.my_handle),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ),
        Span::raw(format!(
            " expires in {}m {:02}s ",
            view.remaining_secs / 60,
            view.remaining_secs % 60
        )),
    ];
    if view.sending {
        spans.push(Span::styled(
            " sending... ",
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), rows[0]);

    let ratio = if view.timeout_secs == 0 {
        0.0
    } else {
        f64::from(view.remaining_secs) / f64::from(view.timeout_secs)
    };
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
        .ratio(ratio.clamp(0.0, 1.0))
        .label("");
    frame.render_widget(gauge, rows[1]);
}
