use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::prelude::CrosstermBackend;
use ratatui::Terminal;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

use crate::editor;
use crate::model::QuestionKind;
use crate::state::{cursor_row_col, AppState, Dialog, InputMode, Screen};

type Term = Terminal<CrosstermBackend<io::Stdout>>;

/// Runs the blocking terminal loop. Must be called from inside the tokio
/// runtime (e.g. via `block_in_place`) because submissions are spawned on it.
pub fn run_tui(mut state: AppState) -> Result<()> {
    enable_raw_mode().context("cannot enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("cannot enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("cannot create terminal")?;

    let result = main_loop(&mut terminal, &mut state);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();

    result
}

fn main_loop(terminal: &mut Term, state: &mut AppState) -> Result<()> {
    let mut events = state.session.subscribe();
    let runtime = Handle::current();

    loop {
        state.refresh();
        terminal
            .draw(|f| crate::ui::draw(f, state))
            .context("draw error")?;

        if state.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(100)).context("poll error")? {
            if let Event::Key(key) = event::read().context("read error")? {
                if key.kind == KeyEventKind::Press {
                    handle_key(key, state, terminal, &runtime);
                }
            }
        }

        loop {
            match events.try_recv() {
                Ok(ev) => state.apply_event(&ev),
                Err(TryRecvError::Lagged(n)) => warn!(skipped = n, "ui fell behind session events"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    if state.screen == Screen::Working {
        // Leave nothing unsaved behind when quitting mid-attempt.
        runtime.block_on(state.session.flush());
        state.persist_progress();
    }
    if let Some(writer) = state.progress_writer.take() {
        runtime.block_on(writer.finish());
    }
    Ok(())
}

fn handle_key(key: KeyEvent, state: &mut AppState, terminal: &mut Term, runtime: &Handle) {
    if state.has_dialog() {
        handle_dialog_key(key, state, runtime);
        return;
    }

    match state.screen {
        Screen::Working => handle_working_key(key, state, terminal),
        Screen::Failed => match key.code {
            KeyCode::Char('r') => {
                let session = state.session.clone();
                runtime.spawn(async move {
                    if let Err(e) = session.retry_submission().await {
                        warn!(error = %e, "retry refused");
                    }
                });
            }
            KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                state.push_dialog(Dialog::ConfirmQuit);
            }
            _ => {}
        },
        Screen::Done | Screen::AlreadySubmitted => {
            if key.code == KeyCode::Enter {
                state.should_quit = true;
            }
        }
        Screen::Submitting => {}
    }
}

fn handle_working_key(key: KeyEvent, state: &mut AppState, terminal: &mut Term) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl {
        match key.code {
            KeyCode::Char('q') => state.push_dialog(Dialog::ConfirmQuit),
            KeyCode::Char('s') => {
                if state.session.request_manual_submit() {
                    state.push_dialog(Dialog::ConfirmSubmit);
                }
            }
            KeyCode::Char('f') => state.toggle_flag(),
            KeyCode::Char('e') => open_external_editor(state, terminal),
            KeyCode::Up | KeyCode::Left => state.navigate_prev(),
            KeyCode::Down | KeyCode::Right => state.navigate_next(),
            _ => {}
        }
        return;
    }

    match state.input_mode {
        InputMode::TextInput => handle_text_input_key(key, state),
        InputMode::ChoiceSelect => handle_choice_key(key, state),
        InputMode::Navigation => handle_nav_key(key, state),
    }
}

fn open_external_editor(state: &mut AppState, terminal: &mut Term) {
    let Some(question) = state.current_question().cloned() else {
        return;
    };
    if !matches!(question.kind, QuestionKind::Essay | QuestionKind::Code) {
        return;
    }
    let initial = match state.session.answer(&question.id) {
        Some(text) => text,
        None => question.code_template.clone().unwrap_or_default(),
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();

    let edited = editor::open_editor(&initial, &question.id);

    execute!(terminal.backend_mut(), EnterAlternateScreen).ok();
    enable_raw_mode().ok();
    terminal.clear().ok();

    match edited {
        Ok(text) => state.replace_text(text),
        Err(e) => {
            warn!(error = %e, "external editor failed");
            state.message = Some(e.to_string());
        }
    }
}

fn handle_text_input_key(key: KeyEvent, state: &mut AppState) {
    let multiline = state
        .current_question()
        .is_some_and(|q| matches!(q.kind, QuestionKind::Essay | QuestionKind::Code));

    // Code answers start from the template on the first keystroke.
    if state.text_input.is_empty() {
        if let Some(template) = state
            .current_question()
            .filter(|q| q.kind == QuestionKind::Code)
            .and_then(|q| q.code_template.clone())
            .filter(|_| matches!(key.code, KeyCode::Char(_) | KeyCode::Enter))
        {
            if state.session.answer(&state.view.current_question_id).is_none() {
                state.replace_text(template);
            }
        }
    }

    match key.code {
        KeyCode::Char(c) => state.insert_char(c),
        KeyCode::Tab if multiline => {
            for _ in 0..4 {
                state.insert_char(' ');
            }
        }
        KeyCode::Backspace => state.backspace(),
        KeyCode::Delete => state.delete(),
        KeyCode::Left => state.cursor_left(),
        KeyCode::Right => state.cursor_right(),
        KeyCode::Enter => {
            if multiline {
                state.insert_char('\n');
            } else {
                state.navigate_next();
            }
        }
        KeyCode::Up => {
            if multiline {
                move_cursor_vertical(state, -1);
            } else {
                state.navigate_prev();
            }
        }
        KeyCode::Down => {
            if multiline {
                move_cursor_vertical(state, 1);
            } else {
                state.navigate_next();
            }
        }
        KeyCode::Home => {
            let before = &state.text_input[..state.text_cursor];
            state.text_cursor = before.rfind('\n').map_or(0, |p| p + 1);
        }
        KeyCode::End => {
            let after = &state.text_input[state.text_cursor..];
            state.text_cursor = after
                .find('\n')
                .map_or(state.text_input.len(), |p| state.text_cursor + p);
        }
        KeyCode::Esc => state.input_mode = InputMode::Navigation,
        _ => {}
    }
}

fn move_cursor_vertical(state: &mut AppState, delta: isize) {
    let (row, col) = cursor_row_col(&state.text_input, state.text_cursor);
    let lines: Vec<&str> = state.text_input.split('\n').collect();
    let target = row as isize + delta;
    if target < 0 || target as usize >= lines.len() {
        return;
    }
    let target = target as usize;
    let line = lines[target];
    let mut col = col.min(line.len());
    while !line.is_char_boundary(col) {
        col -= 1;
    }
    let offset: usize = lines[..target].iter().map(|l| l.len() + 1).sum();
    state.text_cursor = offset + col;
}

fn handle_choice_key(key: KeyEvent, state: &mut AppState) {
    let Some(question) = state.current_question().cloned() else {
        return;
    };
    match (question.kind, key.code) {
        (QuestionKind::MultipleChoice, KeyCode::Char(c)) if c.is_ascii_digit() && c != '0' => {
            state.select_option(c as usize - '1' as usize);
        }
        (QuestionKind::MultipleChoice, KeyCode::Enter | KeyCode::Char(' ')) => {
            state.select_option(state.choice_cursor);
        }
        (QuestionKind::TrueFalse, KeyCode::Char('t')) => state.select_true_false(true),
        (QuestionKind::TrueFalse, KeyCode::Char('f')) => state.select_true_false(false),
        (QuestionKind::TrueFalse, KeyCode::Enter | KeyCode::Char(' ')) => {
            state.select_true_false(state.choice_cursor == 0);
        }
        (_, KeyCode::Tab) => {
            let count = match question.kind {
                QuestionKind::TrueFalse => 2,
                _ => question.options.as_ref().map_or(0, Vec::len),
            };
            if count > 0 {
                state.choice_cursor = (state.choice_cursor + 1) % count;
            }
        }
        _ => handle_nav_key(key, state),
    }
}

fn handle_nav_key(key: KeyEvent, state: &mut AppState) {
    let is_text_question = state
        .current_question()
        .is_some_and(|q| q.kind.is_free_text());
    if is_text_question {
        match key.code {
            KeyCode::Enter => {
                state.input_mode = InputMode::TextInput;
                return;
            }
            KeyCode::Char(c) if c != '?' => {
                state.input_mode = InputMode::TextInput;
                state.insert_char(c);
                return;
            }
            _ => {}
        }
    }

    let total = state.session.attempt().len();
    match key.code {
        KeyCode::Up | KeyCode::Left => state.navigate_prev(),
        KeyCode::Down | KeyCode::Right => state.navigate_next(),
        KeyCode::PageUp => state.navigate_to(state.view.current_index.saturating_sub(5)),
        KeyCode::PageDown => state.navigate_to(state.view.current_index + 5),
        KeyCode::Home => state.navigate_to(0),
        KeyCode::End => state.navigate_to(total.saturating_sub(1)),
        KeyCode::Char('?') => state.push_dialog(Dialog::Help),
        _ => {}
    }
}

fn handle_dialog_key(key: KeyEvent, state: &mut AppState, runtime: &Handle) {
    let Some(dialog) = state.top_dialog().cloned() else {
        return;
    };
    match (dialog, key.code) {
        (Dialog::ConfirmSubmit, KeyCode::Enter) => {
            state.pop_dialog();
            let session = state.session.clone();
            runtime.spawn(async move {
                let outcome = session.confirm_submit().await;
                info!(?outcome, "manual submission finished");
            });
        }
        (Dialog::ConfirmSubmit, KeyCode::Esc) => {
            state.pop_dialog();
            state.session.cancel_submit();
        }
        (Dialog::ConfirmQuit, KeyCode::Enter) => {
            state.pop_dialog();
            state.should_quit = true;
        }
        (Dialog::ConfirmQuit, KeyCode::Esc) => {
            state.pop_dialog();
        }
        (Dialog::TimeWarning(_), KeyCode::Enter | KeyCode::Esc) => {
            state.pop_dialog();
        }
        (Dialog::Help, KeyCode::Esc | KeyCode::Char('?')) => {
            state.pop_dialog();
        }
        _ => {}
    }
}
