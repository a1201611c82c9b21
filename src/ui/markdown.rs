use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Renders a question prompt. Only the subset of markdown that reads well in
/// a terminal is styled; everything else comes through as plain text.
pub fn markdown_to_lines(text: &str) -> Vec<Line<'static>> {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut styles: Vec<Style> = vec![Style::default()];
    let mut in_code_block = false;

    let flush = |current: &mut Vec<Span<'static>>, lines: &mut Vec<Line<'static>>| {
        if !current.is_empty() {
            lines.push(Line::from(std::mem::take(current)));
        }
    };

    for event in Parser::new_ext(text, opts) {
        let top = styles.last().copied().unwrap_or_default();
        match event {
            Event::End(TagEnd::Paragraph) => {
                flush(&mut current, &mut lines);
                lines.push(Line::from(""));
            }
            Event::Start(Tag::Strong) => styles.push(top.add_modifier(Modifier::BOLD)),
            Event::Start(Tag::Emphasis) => styles.push(top.add_modifier(Modifier::ITALIC)),
            Event::Start(Tag::Strikethrough) => {
                styles.push(top.add_modifier(Modifier::CROSSED_OUT))
            }
            Event::End(TagEnd::Strong | TagEnd::Emphasis | TagEnd::Strikethrough) => {
                styles.pop();
            }
            Event::Start(Tag::Item) => {
                current.clear();
                current.push(Span::raw("  • "));
            }
            Event::End(TagEnd::Item) => flush(&mut current, &mut lines),
            Event::End(TagEnd::List(_)) => lines.push(Line::from("")),
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        lines.push(Line::from(Span::styled(
                            format!("  [{}]", lang),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                lines.push(Line::from(""));
            }
            Event::Start(Tag::Heading { level, .. }) => {
                current.clear();
                let prefix = match level {
                    HeadingLevel::H1 => "# ",
                    HeadingLevel::H2 => "## ",
                    _ => "### ",
                };
                current.push(Span::styled(
                    prefix,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                styles.push(top.add_modifier(Modifier::BOLD));
            }
            Event::End(TagEnd::Heading(_)) => {
                styles.pop();
                flush(&mut current, &mut lines);
                lines.push(Line::from(""));
            }
            Event::Text(t) if in_code_block => {
                for code_line in t.lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", code_line),
                        Style::default().fg(Color::Green),
                    )));
                }
            }
            Event::Text(t) => current.push(Span::styled(t.to_string(), top)),
            Event::Code(code) => current.push(Span::styled(
                format!("`{}`", code),
                Style::default().fg(Color::Yellow),
            )),
            Event::SoftBreak => current.push(Span::raw(" ")),
            Event::HardBreak => flush(&mut current, &mut lines),
            Event::Rule => lines.push(Line::from(Span::styled(
                "─".repeat(40),
                Style::default().fg(Color::DarkGray),
            ))),
            _ => {}
        }
    }

    flush(&mut current, &mut lines);
    while lines.last().is_some_and(|l| l.width() == 0) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn renders_emphasis_and_inline_code() {
        let lines = markdown_to_lines("Compute **x** with `f(x)`.");
        assert_eq!(lines.len(), 1);
        assert_eq!(plain(&lines[0]), "Compute x with `f(x)`.");
        assert!(lines[0].spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn code_blocks_keep_their_lines() {
        let lines = markdown_to_lines("Look:\n\n```rust\nfn a() {}\nfn b() {}\n```\n");
        let text: Vec<String> = lines.iter().map(plain).collect();
        assert!(text.contains(&"  fn a() {}".to_string()));
        assert!(text.contains(&"  fn b() {}".to_string()));
        assert!(text.contains(&"  [rust]".to_string()));
    }

    #[test]
    fn list_items_get_bullets() {
        let lines = markdown_to_lines("- one\n- two\n");
        assert_eq!(plain(&lines[0]), "  • one");
        assert_eq!(plain(&lines[1]), "  • two");
    }
}
