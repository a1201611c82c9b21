use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::model::QuestionKind;
use crate::state::{AppState, InputMode};

pub fn draw_keybar(f: &mut Frame, area: Rect, state: &AppState) {
    let kind = state.current_question().map(|q| q.kind);
    let bindings: Vec<(&str, &str)> = match (state.input_mode, kind) {
        (InputMode::TextInput, Some(QuestionKind::Essay | QuestionKind::Code)) => vec![
            ("Esc", "stop editing"),
            ("Ctrl+E", "editor"),
            ("Ctrl+←/→", "prev/next"),
            ("Ctrl+S", "submit"),
            ("Ctrl+Q", "quit"),
        ],
        (InputMode::TextInput, _) => vec![
            ("Enter", "next"),
            ("Esc", "stop editing"),
            ("Ctrl+S", "submit"),
            ("Ctrl+Q", "quit"),
        ],
        (InputMode::ChoiceSelect, Some(QuestionKind::TrueFalse)) => vec![
            ("t/f", "answer"),
            ("arrows", "prev/next"),
            ("Ctrl+F", "flag"),
            ("Ctrl+S", "submit"),
            ("Ctrl+Q", "quit"),
        ],
        (InputMode::ChoiceSelect, _) => vec![
            ("1-9", "answer"),
            ("arrows", "prev/next"),
            ("Ctrl+F", "flag"),
            ("Ctrl+S", "submit"),
            ("Ctrl+Q", "quit"),
        ],
        (InputMode::Navigation, _) => vec![
            ("arrows", "prev/next"),
            ("PgUp/PgDn", "jump 5"),
            ("Ctrl+F", "flag"),
            ("Ctrl+S", "submit"),
            ("?", "help"),
        ],
    };

    let mut spans: Vec<Span> = vec![Span::raw(" ")];
    for (i, (key, action)) in bindings.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("   "));
        }
        spans.push(Span::styled(
            key.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" {}", action)));
    }

    let widget =
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(20, 20, 20)));
    f.render_widget(widget, area);
}
