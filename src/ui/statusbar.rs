use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::model::AutosaveStatus;
use crate::state::AppState;

pub fn draw_statusbar(f: &mut Frame, area: Rect, state: &AppState) {
    let counts = state.status_counts();

    let (save_text, save_color) = match state.view.autosave_status {
        AutosaveStatus::Idle => ("autosave idle", Color::DarkGray),
        AutosaveStatus::Saving => ("saving…", Color::Yellow),
        AutosaveStatus::Saved => ("all changes saved", Color::Green),
        AutosaveStatus::Error => ("save failed, retrying", Color::Red),
    };

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(save_text, Style::default().fg(save_color)),
        Span::raw("   "),
        Span::styled(
            format!("✓ {} answered", counts.answered),
            Style::default().fg(Color::Green),
        ),
        Span::raw("   "),
        Span::styled(
            format!("◐ {} unsaved", counts.unsaved),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw("   "),
        Span::styled(
            format!("⚑ {} flagged", counts.flagged),
            Style::default().fg(Color::Red),
        ),
        Span::raw("   "),
        Span::styled(
            format!("○ {} empty", counts.not_answered + counts.unread),
            Style::default().fg(Color::White),
        ),
    ];
    if let Some(msg) = &state.message {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(msg.clone(), Style::default().fg(Color::Red)));
    }

    let widget = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(30, 30, 30)));
    f.render_widget(widget, area);
}
