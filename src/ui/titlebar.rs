use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::clock::format_duration;
use crate::state::AppState;

const LOW_TIME_SECS: u64 = 120;

pub fn draw_titlebar(f: &mut Frame, area: Rect, state: &AppState) {
    let view = &state.view;
    let secs = view.time_remaining_seconds;

    let timer_text = if view.time_limit_enabled {
        format!(" {} remaining ", format_duration(secs))
    } else {
        format!(" {} (untimed) ", format_duration(secs))
    };
    let timer_style = if view.time_limit_enabled && secs <= LOW_TIME_SECS {
        Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Rgb(200, 200, 120))
    };

    let title_text = format!("[ {} ]", state.session.attempt().title);
    let available = area.width as usize;
    let title_len = title_text.chars().count();
    let timer_len = timer_text.chars().count();
    let center_pad = available.saturating_sub(title_len) / 2;
    let right_pad = available.saturating_sub(center_pad + title_len + timer_len);

    let line = Line::from(vec![
        Span::raw(" ".repeat(center_pad)),
        Span::styled(
            title_text,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(right_pad)),
        Span::styled(timer_text, timer_style),
    ]);

    let widget = Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .alignment(Alignment::Left);
    f.render_widget(widget, area);
}
