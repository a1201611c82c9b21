use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::autosave::AutosavePump;
use crate::error::{SealReason, SessionError};
use crate::model::Attempt;

/// Current position and review flags. Leaving a question always asks the
/// autosave pump to flush it first; navigation never waits on the network.
pub struct NavigationController {
    question_ids: Vec<String>,
    current: usize,
    flagged: HashSet<String>,
    visited: HashSet<String>,
    pump: Arc<AutosavePump>,
    closed: bool,
}

impl NavigationController {
    pub fn new(attempt: &Attempt, pump: Arc<AutosavePump>) -> Self {
        let question_ids = attempt.question_ids();
        let visited = question_ids.first().cloned().into_iter().collect();
        Self {
            question_ids,
            current: 0,
            flagged: HashSet::new(),
            visited,
            pump,
            closed: false,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question_id(&self) -> &str {
        self.question_ids
            .get(self.current)
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::SessionExpired(SealReason::Submitted))
        } else {
            Ok(())
        }
    }

    /// Moves to `index`, clamped to the last question.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.ensure_open()?;
        let leaving = self.current_question_id().to_string();
        if !leaving.is_empty() {
            self.pump.request_flush(&leaving);
        }

        let target = index.min(self.question_ids.len().saturating_sub(1));
        if target != self.current {
            debug!(from = self.current, to = target, "navigate");
            self.current = target;
            if let Some(id) = self.question_ids.get(target) {
                self.visited.insert(id.clone());
            }
        }
        Ok(self.current)
    }

    pub fn next(&mut self) -> Result<usize, SessionError> {
        self.go_to(self.current.saturating_add(1))
    }

    pub fn previous(&mut self) -> Result<usize, SessionError> {
        self.go_to(self.current.saturating_sub(1))
    }

    /// Returns whether the question is flagged after the toggle.
    pub fn toggle_flag(&mut self, question_id: &str) -> Result<bool, SessionError> {
        self.ensure_open()?;
        if !self.question_ids.iter().any(|id| id == question_id) {
            return Err(SessionError::UnknownQuestion(question_id.to_string()));
        }
        if self.flagged.remove(question_id) {
            Ok(false)
        } else {
            self.flagged.insert(question_id.to_string());
            Ok(true)
        }
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.flagged.contains(question_id)
    }

    pub fn is_visited(&self, question_id: &str) -> bool {
        self.visited.contains(question_id)
    }

    /// Flagged ids in attempt order.
    pub fn flagged(&self) -> Vec<String> {
        self.question_ids
            .iter()
            .filter(|id| self.flagged.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Restores a previous position and flag set; unknown ids are dropped.
    pub fn restore(&mut self, index: usize, flagged: &[String]) {
        self.current = index.min(self.question_ids.len().saturating_sub(1));
        self.flagged = flagged
            .iter()
            .filter(|id| self.question_ids.contains(id))
            .cloned()
            .collect();
        if let Some(id) = self.question_ids.get(self.current) {
            self.visited.insert(id.clone());
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
