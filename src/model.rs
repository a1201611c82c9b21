use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::ClockEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
    Code,
}

impl QuestionKind {
    pub fn label(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "Multiple choice",
            QuestionKind::TrueFalse => "True / false",
            QuestionKind::ShortAnswer => "Short answer",
            QuestionKind::Essay => "Essay",
            QuestionKind::Code => "Code",
        }
    }

    /// Free-text kinds are edited as text rather than picked from a list.
    pub fn is_free_text(&self) -> bool {
        matches!(
            self,
            QuestionKind::ShortAnswer | QuestionKind::Essay | QuestionKind::Code
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_template: Option<String>,
    pub marks: f64,
    pub order: i64,
}

/// One student's fixed view of a quiz. Built once by a question supply and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: String,
    pub title: String,
    pub questions: Vec<Question>,
    pub duration_seconds: u64,
    pub time_limit_enabled: bool,
    pub total_marks: f64,
    pub source_hash: String,
}

impl Attempt {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == id)
    }

    pub fn question_ids(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub value: String,
    pub dirty: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutosaveStatus {
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Active,
    Submitting,
    Submitted,
    Failed,
}

/// Final payload entry handed to the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Clock(ClockEvent),
    Autosave(AutosaveStatus),
    Submission(SubmissionState),
    ConfirmationRequested,
    ConfirmationCancelled,
}
