use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{SealReason, SessionError};
use crate::model::{Answer, Attempt, SubmittedAnswer};

#[derive(Debug, Default)]
struct BufferInner {
    answers: Arc<HashMap<String, Answer>>,
    seal: Option<SealReason>,
}

/// Single source of truth for answer values and their unsaved status.
///
/// Mutation goes through `set`, `mark_saved` and `restore` only. The map sits
/// behind an `Arc` and is cloned on write, so a snapshot is a pointer copy
/// taken under a lock that is never held across an await.
#[derive(Debug)]
pub struct AnswerBuffer {
    order: Arc<[String]>,
    inner: Mutex<BufferInner>,
}

impl AnswerBuffer {
    pub fn new(attempt: &Attempt) -> Self {
        Self {
            order: attempt.question_ids().into(),
            inner: Mutex::new(BufferInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_known(&self, question_id: &str) -> Result<(), SessionError> {
        if self.order.iter().any(|id| id == question_id) {
            Ok(())
        } else {
            Err(SessionError::UnknownQuestion(question_id.to_string()))
        }
    }

    pub fn get(&self, question_id: &str) -> Option<String> {
        self.lock()
            .answers
            .get(question_id)
            .map(|a| a.value.clone())
    }

    pub fn answer(&self, question_id: &str) -> Option<Answer> {
        self.lock().answers.get(question_id).cloned()
    }

    pub fn is_dirty(&self, question_id: &str) -> bool {
        self.lock()
            .answers
            .get(question_id)
            .map(|a| a.dirty)
            .unwrap_or(false)
    }

    /// Current value, but only while it still needs saving.
    pub fn pending_value(&self, question_id: &str) -> Option<String> {
        self.lock()
            .answers
            .get(question_id)
            .filter(|a| a.dirty)
            .map(|a| a.value.clone())
    }

    /// Overwrites the value and marks it dirty, even when unchanged.
    pub fn set(&self, question_id: &str, value: impl Into<String>) -> Result<(), SessionError> {
        self.check_known(question_id)?;
        let mut inner = self.lock();
        if let Some(reason) = inner.seal {
            return Err(SessionError::SessionExpired(reason));
        }
        let value = value.into();
        let answers = Arc::make_mut(&mut inner.answers);
        match answers.get_mut(question_id) {
            Some(answer) => {
                answer.value = value;
                answer.dirty = true;
            }
            None => {
                answers.insert(
                    question_id.to_string(),
                    Answer {
                        question_id: question_id.to_string(),
                        value,
                        dirty: true,
                        last_saved_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    /// Clears dirty only if the buffer still holds the value that was saved.
    /// Returns whether the entry is now clean.
    pub fn mark_saved(&self, question_id: &str, value_at_save: &str, at: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let matches = inner
            .answers
            .get(question_id)
            .map(|a| a.value == value_at_save)
            .unwrap_or(false);
        if !matches {
            debug!(question_id, "stale save acknowledgement; entry stays dirty");
            return false;
        }
        let answers = Arc::make_mut(&mut inner.answers);
        if let Some(answer) = answers.get_mut(question_id) {
            answer.dirty = false;
            answer.last_saved_at = Some(at);
        }
        true
    }

    /// Seeds an already-persisted value as a clean entry. Used when resuming.
    pub fn restore(
        &self,
        question_id: &str,
        value: impl Into<String>,
        saved_at: Option<DateTime<Utc>>,
    ) -> Result<(), SessionError> {
        self.check_known(question_id)?;
        let mut inner = self.lock();
        if let Some(reason) = inner.seal {
            return Err(SessionError::SessionExpired(reason));
        }
        Arc::make_mut(&mut inner.answers).insert(
            question_id.to_string(),
            Answer {
                question_id: question_id.to_string(),
                value: value.into(),
                dirty: false,
                last_saved_at: saved_at,
            },
        );
        Ok(())
    }

    /// Dirty question ids in attempt order.
    pub fn dirty_ids(&self) -> Vec<String> {
        let answers = Arc::clone(&self.lock().answers);
        self.order
            .iter()
            .filter(|id| answers.get(id.as_str()).map(|a| a.dirty).unwrap_or(false))
            .cloned()
            .collect()
    }

    pub fn snapshot_all(&self) -> Snapshot {
        let answers = Arc::clone(&self.lock().answers);
        Snapshot {
            taken_at: Utc::now(),
            order: Arc::clone(&self.order),
            answers,
        }
    }

    /// Refuses every later `set`. The first reason sticks unless the attempt
    /// is being marked submitted.
    pub fn seal(&self, reason: SealReason) {
        let mut inner = self.lock();
        match inner.seal {
            None => inner.seal = Some(reason),
            Some(_) if reason == SealReason::Submitted => inner.seal = Some(reason),
            Some(_) => {}
        }
    }

    pub fn seal_reason(&self) -> Option<SealReason> {
        self.lock().seal
    }
}

/// Immutable point-in-time copy of every touched answer.
#[derive(Debug, Clone)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    order: Arc<[String]>,
    answers: Arc<HashMap<String, Answer>>,
}

impl Snapshot {
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Touched answers in attempt order.
    pub fn answers(&self) -> Vec<Answer> {
        self.order
            .iter()
            .filter_map(|id| self.answers.get(id.as_str()).cloned())
            .collect()
    }

    pub fn value(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(|a| a.value.as_str())
    }

    /// One entry per question in attempt order; untouched questions are empty.
    pub fn to_submission(&self) -> Vec<SubmittedAnswer> {
        self.order
            .iter()
            .map(|id| SubmittedAnswer {
                question_id: id.clone(),
                value: self
                    .answers
                    .get(id.as_str())
                    .map(|a| a.value.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Question, QuestionKind};

    fn attempt() -> Attempt {
        let question = |id: &str, order: i64| Question {
            id: id.to_string(),
            kind: QuestionKind::ShortAnswer,
            prompt: format!("Prompt {}", id),
            options: None,
            code_template: None,
            marks: 1.0,
            order,
        };
        Attempt {
            id: "a1".to_string(),
            title: "Buffer".to_string(),
            questions: vec![question("q1", 1), question("q2", 2), question("q3", 3)],
            duration_seconds: 60,
            time_limit_enabled: true,
            total_marks: 3.0,
            source_hash: "sha256:test".to_string(),
        }
    }

    #[test]
    fn last_write_wins() {
        let buffer = AnswerBuffer::new(&attempt());
        for value in ["a", "ab", "abc", "x"] {
            buffer.set("q1", value).unwrap();
        }
        assert_eq!(buffer.get("q1").as_deref(), Some("x"));
        assert!(buffer.is_dirty("q1"));
    }

    #[test]
    fn set_marks_dirty_even_when_value_is_unchanged() {
        let buffer = AnswerBuffer::new(&attempt());
        buffer.set("q1", "same").unwrap();
        assert!(buffer.mark_saved("q1", "same", Utc::now()));
        assert!(!buffer.is_dirty("q1"));

        buffer.set("q1", "same").unwrap();
        assert!(buffer.is_dirty("q1"));
    }

    #[test]
    fn stale_ack_does_not_clear_newer_value() {
        let buffer = AnswerBuffer::new(&attempt());
        buffer.set("q1", "old").unwrap();
        buffer.set("q1", "new").unwrap();

        assert!(!buffer.mark_saved("q1", "old", Utc::now()));
        assert!(buffer.is_dirty("q1"));
        assert_eq!(buffer.answer("q1").unwrap().last_saved_at, None);

        assert!(buffer.mark_saved("q1", "new", Utc::now()));
        assert!(!buffer.is_dirty("q1"));
    }

    #[test]
    fn snapshot_is_isolated_from_later_edits() {
        let buffer = AnswerBuffer::new(&attempt());
        buffer.set("q2", "before").unwrap();
        let snapshot = buffer.snapshot_all();
        buffer.set("q2", "after").unwrap();
        buffer.set("q1", "late").unwrap();

        assert_eq!(snapshot.value("q2"), Some("before"));
        assert_eq!(snapshot.answers().len(), 1);
        let payload = snapshot.to_submission();
        assert_eq!(payload.len(), 3);
        assert_eq!(payload[0].value, "");
        assert_eq!(payload[1].value, "before");
    }

    #[test]
    fn sealed_buffer_rejects_edits_but_accepts_acks() {
        let buffer = AnswerBuffer::new(&attempt());
        buffer.set("q1", "draft").unwrap();
        buffer.seal(SealReason::Expired);

        assert_eq!(
            buffer.set("q1", "more"),
            Err(SessionError::SessionExpired(SealReason::Expired))
        );
        assert!(buffer.mark_saved("q1", "draft", Utc::now()));

        buffer.seal(SealReason::Finalizing);
        assert_eq!(buffer.seal_reason(), Some(SealReason::Expired));
        buffer.seal(SealReason::Submitted);
        assert_eq!(buffer.seal_reason(), Some(SealReason::Submitted));
    }

    #[test]
    fn unknown_questions_are_rejected() {
        let buffer = AnswerBuffer::new(&attempt());
        assert_eq!(
            buffer.set("nope", "x"),
            Err(SessionError::UnknownQuestion("nope".to_string()))
        );
        assert!(buffer.dirty_ids().is_empty());
    }

    #[test]
    fn dirty_ids_follow_attempt_order() {
        let buffer = AnswerBuffer::new(&attempt());
        buffer.set("q3", "c").unwrap();
        buffer.set("q1", "a").unwrap();
        buffer.restore("q2", "b", Some(Utc::now())).unwrap();
        assert_eq!(buffer.dirty_ids(), vec!["q1".to_string(), "q3".to_string()]);
    }
}
