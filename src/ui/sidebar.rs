use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
};
use ratatui::Frame;

use crate::state::{AppState, QuestionStatus};

pub fn status_icon(status: QuestionStatus) -> (&'static str, Color) {
    match status {
        QuestionStatus::Unread => ("·", Color::DarkGray),
        QuestionStatus::NotAnswered => ("○", Color::White),
        QuestionStatus::Answered => ("✓", Color::Green),
        QuestionStatus::Unsaved => ("◐", Color::Yellow),
        QuestionStatus::Flagged => ("⚑", Color::Red),
    }
}

pub fn draw_sidebar(f: &mut Frame, area: Rect, state: &AppState) {
    let questions = &state.session.attempt().questions;
    let current = state.view.current_index;
    let visible = area.height.saturating_sub(1) as usize; // title row

    // Keep the current question on screen.
    let scroll = if current >= state.sidebar_scroll + visible {
        current + 1 - visible
    } else {
        state.sidebar_scroll.min(current)
    };

    let label_width = area.width.saturating_sub(11) as usize;
    let mut lines: Vec<Line> = Vec::new();

    for (i, q) in questions.iter().enumerate().skip(scroll).take(visible) {
        let status = state.question_status(q);
        let (icon, color) = status_icon(status);
        let is_current = i == current;
        let bg = if is_current { Color::DarkGray } else { Color::Reset };
        let style = if is_current {
            Style::default()
                .fg(Color::White)
                .bg(bg)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().bg(bg)
        };

        let mut label: String = q.kind.label().chars().take(label_width).collect();
        if q.kind.label().chars().count() > label_width && label_width > 0 {
            label.pop();
            label.push('…');
        }

        lines.push(Line::from(vec![
            Span::styled(if is_current { " ▸ " } else { "   " }, style),
            Span::styled(format!("{} ", icon), Style::default().fg(color).bg(bg)),
            Span::styled(format!("{:>2}. ", i + 1), style),
            Span::styled(label, style),
        ]));
    }

    let title = format!(" {} Questions ", questions.len());
    let block = Block::default()
        .borders(Borders::RIGHT)
        .title(title)
        .title_style(Style::default().add_modifier(Modifier::BOLD));
    f.render_widget(Paragraph::new(lines).block(block), area);

    if questions.len() > visible {
        let scrollbar_area = Rect {
            x: area.x,
            y: area.y + 1,
            width: area.width,
            height: visible as u16,
        };
        let mut scrollbar_state = ScrollbarState::new(questions.len().saturating_sub(1))
            .position(current)
            .viewport_content_length(3);
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scrollbar_area,
            &mut scrollbar_state,
        );
    }
}
