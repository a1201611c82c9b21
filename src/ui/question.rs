use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
};
use ratatui::Frame;

use crate::model::{Question, QuestionKind};
use crate::state::{cursor_row_col, AppState, InputMode};
use crate::ui::markdown::markdown_to_lines;

const PLACEHOLDER: &str = "Type your answer...";

/// Wrap text to fit within `width` columns, breaking at word boundaries.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut result = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            result.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    if result.is_empty() {
        result.push(String::new());
    }
    result
}

fn choice_lines(
    lines: &mut Vec<Line<'static>>,
    labels: &[String],
    selected: Option<usize>,
    cursor: usize,
    width: u16,
    key_for: impl Fn(usize) -> String,
) {
    lines.push(Line::from(""));
    for (i, label) in labels.iter().enumerate() {
        let is_selected = selected == Some(i);
        let radio = if is_selected { "(●)" } else { "( )" };
        let marker = if i == cursor { "▸" } else { " " };
        let style = if is_selected {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };

        let prefix = format!(" {} {} {}. ", marker, radio, key_for(i));
        let prefix_len = prefix.chars().count();
        let text_width = (width as usize).saturating_sub(prefix_len + 2);
        for (li, row) in wrap_text(label, text_width).into_iter().enumerate() {
            let lead = if li == 0 {
                Span::styled(prefix.clone(), style)
            } else {
                Span::raw(" ".repeat(prefix_len))
            };
            lines.push(Line::from(vec![lead, Span::styled(row, style)]));
        }
    }
}

/// Box with the answer text; shows a block cursor while editing.
fn text_box(
    lines: &mut Vec<Line<'static>>,
    text: &str,
    cursor: Option<usize>,
    width: u16,
    rows: usize,
) {
    let dashes = width.saturating_sub(6) as usize;
    let inner = width.saturating_sub(8) as usize;
    let text_style = Style::default().fg(Color::White);
    let cursor_style = Style::default().fg(Color::Black).bg(Color::White);

    lines.push(Line::from(format!("  ┌{}┐", "─".repeat(dashes))));

    let logical: Vec<&str> = text.split('\n').collect();
    let (cursor_row, cursor_col) = match cursor {
        Some(c) => {
            let (r, col) = cursor_row_col(text, c);
            (Some(r), col)
        }
        None => (None, 0),
    };
    let first = cursor_row.map_or(0, |r| (r + 1).saturating_sub(rows));

    for i in 0..rows {
        let idx = first + i;
        let mut spans = vec![Span::raw("  │ ")];
        let used = match logical.get(idx) {
            _ if text.is_empty() && idx == 0 && cursor.is_none() => {
                spans.push(Span::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray)));
                PLACEHOLDER.chars().count()
            }
            Some(row) if cursor_row == Some(idx) => {
                let col = cursor_col.min(row.len());
                let before = &row[..col];
                let mut after = row[col..].chars();
                let at = after.next();
                let rest: String = after.collect();
                spans.push(Span::styled(before.to_string(), text_style));
                spans.push(Span::styled(
                    at.map_or(" ".to_string(), |c| c.to_string()),
                    cursor_style,
                ));
                spans.push(Span::styled(rest, text_style));
                row.chars().count() + usize::from(at.is_none())
            }
            Some(row) => {
                let shown: String = row.chars().take(inner).collect();
                let n = shown.chars().count();
                spans.push(Span::styled(shown, text_style));
                n
            }
            None => 0,
        };
        spans.push(Span::raw(" ".repeat(inner.saturating_sub(used))));
        spans.push(Span::raw(" │"));
        lines.push(Line::from(spans));
    }

    let indicator = if logical.len() > 1 {
        format!(
            "[line {} of {}]",
            cursor_row.map_or(1, |r| r + 1),
            logical.len()
        )
    } else {
        String::new()
    };
    lines.push(Line::from(vec![
        Span::raw(format!(
            "  └{}",
            "─".repeat(dashes.saturating_sub(indicator.chars().count()))
        )),
        Span::styled(indicator, Style::default().fg(Color::DarkGray)),
        Span::raw("┘"),
    ]));
}

fn header(question: &Question, index: usize, flagged: bool) -> Line<'static> {
    let mut spans = vec![Span::styled(
        format!("  {}. {}", index + 1, question.kind.label()),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::styled(
        format!("  ({} marks)", question.marks),
        Style::default().fg(Color::DarkGray),
    ));
    if flagged {
        spans.push(Span::styled(
            "  ⚑ flagged",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    Line::from(spans)
}

pub fn draw_question(f: &mut Frame, area: Rect, state: &AppState) {
    let Some(question) = state.current_question() else {
        let p = Paragraph::new("No questions").block(Block::default().borders(Borders::ALL));
        f.render_widget(p, area);
        return;
    };

    let flagged = state.view.flagged.iter().any(|id| id == &question.id);
    let mut lines: Vec<Line<'static>> = vec![
        header(question, state.view.current_index, flagged),
        Line::from(""),
    ];
    for line in markdown_to_lines(&question.prompt) {
        let mut spans = vec![Span::raw("  ")];
        spans.extend(line.spans);
        lines.push(Line::from(spans));
    }

    let value = state.session.answer(&question.id);
    let editing = state.input_mode == InputMode::TextInput;

    match question.kind {
        QuestionKind::MultipleChoice => {
            let options = question.options.clone().unwrap_or_default();
            let selected = value
                .as_ref()
                .and_then(|v| options.iter().position(|o| o == v));
            choice_lines(
                &mut lines,
                &options,
                selected,
                state.choice_cursor,
                area.width,
                |i| (i + 1).to_string(),
            );
        }
        QuestionKind::TrueFalse => {
            let labels = ["True".to_string(), "False".to_string()];
            let selected = match value.as_deref() {
                Some("true") => Some(0),
                Some("false") => Some(1),
                _ => None,
            };
            choice_lines(
                &mut lines,
                &labels,
                selected,
                state.choice_cursor,
                area.width,
                |i| if i == 0 { "t".into() } else { "f".into() },
            );
        }
        QuestionKind::ShortAnswer | QuestionKind::Essay | QuestionKind::Code => {
            lines.push(Line::from(""));
            let (text, cursor) = if editing {
                (state.text_input.clone(), Some(state.text_cursor))
            } else {
                (value.clone().unwrap_or_default(), None)
            };
            let rows = match question.kind {
                QuestionKind::ShortAnswer => 1,
                _ => (area.height as usize)
                    .saturating_sub(lines.len() + 4)
                    .max(3),
            };
            // An untouched code answer previews its template.
            let text = match &question.code_template {
                Some(template) if value.is_none() && !editing => template.clone(),
                _ => text,
            };
            text_box(&mut lines, &text, cursor, area.width, rows);
        }
    }

    if state.session.is_dirty(&question.id) {
        let note = if state.session.is_saving(&question.id) {
            "  saving…"
        } else {
            "  unsaved changes"
        };
        lines.push(Line::from(Span::styled(
            note,
            Style::default().fg(Color::Yellow),
        )));
    }

    let total = lines.len();
    let visible = area.height as usize;
    let scroll = state.question_scroll.min(total.saturating_sub(visible));
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0));
    f.render_widget(widget, area);

    if total > visible {
        let mut scrollbar_state = ScrollbarState::new(total)
            .position(scroll)
            .viewport_content_length(visible);
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}
