use chrono::{DateTime, Local, Utc};
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::state::AppState;

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn render_centered(f: &mut Frame, area: Rect, lines: Vec<Line>) {
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

pub fn draw_submitting(f: &mut Frame, area: Rect, _state: &AppState) {
    let lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            "Submitting...",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Saving remaining answers and sending your attempt."),
    ];
    render_centered(f, area, lines);
}

pub fn draw_failed(f: &mut Frame, area: Rect, state: &AppState) {
    let error = state
        .view
        .last_error
        .clone()
        .unwrap_or_else(|| "unknown error".to_string());
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "✗  Submission Failed",
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(error),
        Line::from(""),
        Line::from("Your answers are kept exactly as they were when you submitted."),
        Line::from(""),
        Line::from(Span::styled(
            "[r] Retry submission    [Ctrl+Q] Quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    render_centered(f, area, lines);
}

pub fn draw_done(f: &mut Frame, area: Rect, state: &AppState) {
    let when = state
        .view
        .finalized_at
        .map(local_time)
        .unwrap_or_else(|| "just now".to_string());
    let lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            "✓  Attempt Submitted Successfully",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Submitted: {}", when)),
        Line::from(""),
        Line::from(Span::styled(
            "[Enter] Exit",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    render_centered(f, area, lines);
}

pub fn draw_already_submitted(f: &mut Frame, area: Rect, state: &AppState) {
    let when = state
        .previous_submission
        .map(local_time)
        .unwrap_or_else(|| "unknown".to_string());
    let lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            "✓ Attempt Already Submitted",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Submitted: {}", when)),
        Line::from(""),
        Line::from("You cannot modify your submission."),
        Line::from(""),
        Line::from(Span::styled(
            "[Enter] Exit",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    render_centered(f, area, lines);
}
