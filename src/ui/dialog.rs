use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::clock::format_duration;
use crate::state::{AppState, Dialog};

pub fn draw_dialog(f: &mut Frame, area: Rect, state: &AppState) {
    let Some(dialog) = state.top_dialog() else {
        return;
    };

    match dialog {
        Dialog::ConfirmSubmit => draw_confirm_submit(f, area, state),
        Dialog::ConfirmQuit => draw_confirm_quit(f, area),
        Dialog::TimeWarning(remaining) => draw_time_warning(f, area, *remaining),
        Dialog::Help => draw_help(f, area),
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

fn confirm_line() -> Line<'static> {
    Line::from(vec![
        Span::styled("   [Enter] Confirm", Style::default().fg(Color::Green)),
        Span::raw("    "),
        Span::styled("[Esc] Cancel", Style::default().fg(Color::DarkGray)),
    ])
}

fn render_box(f: &mut Frame, area: Rect, width: u16, lines: Vec<Line>, border: Color) {
    let rect = centered_rect(width, lines.len() as u16 + 2, area);
    f.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    f.render_widget(Paragraph::new(lines).block(block), rect);
}

fn draw_confirm_submit(f: &mut Frame, area: Rect, state: &AppState) {
    let counts = state.status_counts();
    let unanswered = counts.not_answered + counts.unread;
    let mut lines: Vec<Line> = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Submit your attempt?",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    if unanswered > 0 {
        lines.push(Line::from(format!(
            "   {} questions are not answered.",
            unanswered
        )));
    }
    if counts.flagged > 0 {
        lines.push(Line::from(format!(
            "   {} questions are flagged.",
            counts.flagged
        )));
    }
    lines.push(Line::from("   Answers cannot be changed afterwards."));
    lines.push(Line::from(""));
    lines.push(confirm_line());

    render_box(f, area, 44, lines, Color::Yellow);
}

fn draw_confirm_quit(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Quit?",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("   Answers are saved; the clock"),
        Line::from("   keeps its deadline on resume."),
        Line::from(""),
        confirm_line(),
    ];
    render_box(f, area, 40, lines, Color::Yellow);
}

fn draw_time_warning(f: &mut Frame, area: Rect, remaining: u64) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("   ⚠  {} REMAINING", format_duration(remaining).to_uppercase()),
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("   Your attempt is submitted"),
        Line::from("   automatically when time runs out."),
        Line::from(""),
        Line::from(Span::styled(
            "          [Enter] Continue",
            Style::default().fg(Color::Green),
        )),
    ];
    render_box(f, area, 42, lines, Color::Red);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Key Bindings",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("   arrows     Previous/Next question"),
        Line::from("   PgUp/PgDn  Jump 5 questions"),
        Line::from("   Home/End   First/Last question"),
        Line::from("   1-9        Pick an option"),
        Line::from("   t / f      True / False"),
        Line::from("   Ctrl+F     Toggle flag"),
        Line::from("   Ctrl+E     Open editor (essay/code)"),
        Line::from("   Ctrl+S     Submit attempt"),
        Line::from("   Ctrl+Q     Quit (answers are saved)"),
        Line::from("   ?          This help"),
        Line::from(""),
        Line::from(Span::styled(
            "        [Esc] Close",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let rect = centered_rect(46, lines.len() as u16 + 2, area);
    f.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Help ")
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Paragraph::new(lines).block(block), rect);
}
