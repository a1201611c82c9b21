use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::ClockEvent;
use crate::error::SessionError;
use crate::model::{Question, QuestionKind, SessionEvent, SubmissionState};
use crate::session::{AttemptSession, SessionView};
use crate::store::{LocalStore, Progress, ProgressWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Working,
    Submitting,
    Failed,
    Done,
    AlreadySubmitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    ConfirmSubmit,
    ConfirmQuit,
    TimeWarning(u64),
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Navigation,
    ChoiceSelect,
    TextInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    Unread,
    NotAnswered,
    Answered,
    Unsaved,
    Flagged,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatusCounts {
    pub answered: usize,
    pub unsaved: usize,
    pub flagged: usize,
    pub not_answered: usize,
    pub unread: usize,
}

/// Terminal-side state. Everything about the attempt itself lives in the
/// session; this only tracks what the screen needs between frames.
pub struct AppState {
    pub session: AttemptSession,
    pub progress_writer: Option<ProgressWriter>,
    pub view: SessionView,
    pub screen: Screen,
    pub dialogs: Vec<Dialog>,
    pub input_mode: InputMode,
    pub text_input: String,
    /// Byte offset into `text_input`, always on a char boundary.
    pub text_cursor: usize,
    pub choice_cursor: usize,
    pub question_scroll: usize,
    pub sidebar_scroll: usize,
    pub message: Option<String>,
    pub should_quit: bool,
    pub previous_submission: Option<DateTime<Utc>>,
}

impl AppState {
    pub fn new(session: AttemptSession, store: Option<Arc<LocalStore>>) -> Self {
        let view = session.view();
        let mut state = Self {
            session,
            progress_writer: store.map(ProgressWriter::spawn),
            view,
            screen: Screen::Working,
            dialogs: Vec::new(),
            input_mode: InputMode::Navigation,
            text_input: String::new(),
            text_cursor: 0,
            choice_cursor: 0,
            question_scroll: 0,
            sidebar_scroll: 0,
            message: None,
            should_quit: false,
            previous_submission: None,
        };
        state.enter_current_question();
        state
    }

    /// Opens straight onto the read-only screen for a finished attempt.
    pub fn already_submitted(session: AttemptSession, finalized_at: DateTime<Utc>) -> Self {
        let mut state = Self::new(session, None);
        state.screen = Screen::AlreadySubmitted;
        state.previous_submission = Some(finalized_at);
        state
    }

    pub fn refresh(&mut self) {
        self.view = self.session.view();
        if self.screen == Screen::AlreadySubmitted {
            return;
        }
        self.screen = match self.view.submission_state {
            SubmissionState::Active => Screen::Working,
            SubmissionState::Submitting => Screen::Submitting,
            SubmissionState::Failed => Screen::Failed,
            SubmissionState::Submitted => Screen::Done,
        };
        if self.screen != Screen::Working {
            self.dialogs
                .retain(|d| matches!(d, Dialog::ConfirmQuit | Dialog::Help));
        }
    }

    pub fn apply_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Clock(ClockEvent::Warning { remaining }) => {
                if self.screen == Screen::Working
                    && !self.dialogs.iter().any(|d| matches!(d, Dialog::TimeWarning(_)))
                {
                    self.push_dialog(Dialog::TimeWarning(*remaining));
                }
            }
            SessionEvent::ConfirmationCancelled => {
                self.dialogs.retain(|d| *d != Dialog::ConfirmSubmit);
            }
            _ => {}
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session.attempt().questions.get(self.view.current_index)
    }

    pub fn question_status(&self, question: &Question) -> QuestionStatus {
        if self.view.flagged.iter().any(|id| id == &question.id) {
            return QuestionStatus::Flagged;
        }
        if self.session.is_dirty(&question.id) {
            return QuestionStatus::Unsaved;
        }
        let answered = self
            .session
            .answer(&question.id)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if answered {
            QuestionStatus::Answered
        } else if self.session.is_visited(&question.id) {
            QuestionStatus::NotAnswered
        } else {
            QuestionStatus::Unread
        }
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for q in &self.session.attempt().questions {
            match self.question_status(q) {
                QuestionStatus::Answered => counts.answered += 1,
                QuestionStatus::Unsaved => counts.unsaved += 1,
                QuestionStatus::Flagged => counts.flagged += 1,
                QuestionStatus::NotAnswered => counts.not_answered += 1,
                QuestionStatus::Unread => counts.unread += 1,
            }
        }
        counts
    }

    pub fn has_dialog(&self) -> bool {
        !self.dialogs.is_empty()
    }

    pub fn top_dialog(&self) -> Option<&Dialog> {
        self.dialogs.last()
    }

    pub fn push_dialog(&mut self, dialog: Dialog) {
        self.dialogs.push(dialog);
    }

    pub fn pop_dialog(&mut self) -> Option<Dialog> {
        self.dialogs.pop()
    }

    /// Loads the buffered answer of the newly current question into the
    /// local editing state.
    pub fn enter_current_question(&mut self) {
        let (kind, id, options) = match self.current_question() {
            Some(q) => (q.kind, q.id.clone(), q.options.clone().unwrap_or_default()),
            None => return,
        };
        let value = self.session.answer(&id).unwrap_or_default();
        self.question_scroll = 0;
        self.choice_cursor = match kind {
            QuestionKind::MultipleChoice => options.iter().position(|o| *o == value).unwrap_or(0),
            QuestionKind::TrueFalse => usize::from(value == "false"),
            _ => 0,
        };
        self.input_mode = if kind.is_free_text() {
            InputMode::TextInput
        } else {
            InputMode::ChoiceSelect
        };
        self.text_cursor = value.len();
        self.text_input = value;
    }

    pub fn navigate_to(&mut self, index: usize) {
        match self.session.go_to(index) {
            Ok(_) => {
                self.refresh();
                self.enter_current_question();
                self.persist_progress();
            }
            Err(e) => self.report(e),
        }
    }

    pub fn navigate_next(&mut self) {
        let total = self.session.attempt().len();
        if self.view.current_index + 1 < total {
            self.navigate_to(self.view.current_index + 1);
        }
    }

    pub fn navigate_prev(&mut self) {
        if self.view.current_index > 0 {
            self.navigate_to(self.view.current_index - 1);
        }
    }

    pub fn toggle_flag(&mut self) {
        let id = self.view.current_question_id.clone();
        match self.session.toggle_flag(&id) {
            Ok(_) => {
                self.refresh();
                self.persist_progress();
            }
            Err(e) => self.report(e),
        }
    }

    fn set_answer(&mut self, value: String) {
        let id = self.view.current_question_id.clone();
        match self.session.set_answer(&id, value) {
            Ok(()) => self.message = None,
            Err(e) => self.report(e),
        }
    }

    pub fn select_option(&mut self, index: usize) {
        let Some(option) = self
            .current_question()
            .and_then(|q| q.options.as_ref())
            .and_then(|opts| opts.get(index))
            .cloned()
        else {
            return;
        };
        self.choice_cursor = index;
        self.set_answer(option);
    }

    pub fn select_true_false(&mut self, value: bool) {
        self.choice_cursor = usize::from(!value);
        self.set_answer(value.to_string());
    }

    /// Replaces the whole text answer, e.g. after an external editor.
    pub fn replace_text(&mut self, text: String) {
        self.text_cursor = text.len();
        self.text_input = text.clone();
        self.set_answer(text);
    }

    pub fn insert_char(&mut self, c: char) {
        self.text_input.insert(self.text_cursor, c);
        self.text_cursor += c.len_utf8();
        self.set_answer(self.text_input.clone());
    }

    pub fn backspace(&mut self) {
        if let Some(prev) = prev_boundary(&self.text_input, self.text_cursor) {
            self.text_input.replace_range(prev..self.text_cursor, "");
            self.text_cursor = prev;
            self.set_answer(self.text_input.clone());
        }
    }

    pub fn delete(&mut self) {
        if let Some(next) = next_boundary(&self.text_input, self.text_cursor) {
            self.text_input.replace_range(self.text_cursor..next, "");
            self.set_answer(self.text_input.clone());
        }
    }

    pub fn cursor_left(&mut self) {
        if let Some(prev) = prev_boundary(&self.text_input, self.text_cursor) {
            self.text_cursor = prev;
        }
    }

    pub fn cursor_right(&mut self) {
        if let Some(next) = next_boundary(&self.text_input, self.text_cursor) {
            self.text_cursor = next;
        }
    }

    pub fn report(&mut self, error: SessionError) {
        debug!(error = %error, "session refused action");
        self.message = Some(error.to_string());
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current_index: self.view.current_index,
            flagged: self.view.flagged.clone(),
            started_at: self.session.started_at(),
        }
    }

    pub fn persist_progress(&self) {
        if let Some(writer) = &self.progress_writer {
            writer.update(self.progress());
        }
    }
}

fn prev_boundary(s: &str, at: usize) -> Option<usize> {
    s[..at].char_indices().next_back().map(|(i, _)| i)
}

fn next_boundary(s: &str, at: usize) -> Option<usize> {
    s[at..].chars().next().map(|c| at + c.len_utf8())
}

/// (row, column in bytes) of a cursor in multi-line text.
pub fn cursor_row_col(text: &str, cursor: usize) -> (usize, usize) {
    let pos = cursor.min(text.len());
    let before = &text[..pos];
    let row = before.matches('\n').count();
    let col = before.rfind('\n').map_or(pos, |p| pos - p - 1);
    (row, col)
}
