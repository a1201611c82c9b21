#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Notify};

use quizsession::config::SessionConfig;
use quizsession::error::GatewayError;
use quizsession::gateway::PersistenceGateway;
use quizsession::model::{
    Attempt, AutosaveStatus, Question, QuestionKind, Receipt, SessionEvent, SubmittedAnswer,
};
use quizsession::retry::RetrySettings;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Save { question_id: String, value: String },
    Submit { answers: Vec<SubmittedAnswer> },
}

/// In-memory gateway that plays back scripted results and records every call.
/// Unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedGateway {
    saves: Mutex<HashMap<String, VecDeque<Result<(), GatewayError>>>>,
    submits: Mutex<VecDeque<Result<(), GatewayError>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<Call>>,
    latency: Option<Duration>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn script_save(&self, question_id: &str, results: Vec<Result<(), GatewayError>>) {
        self.saves
            .lock()
            .unwrap()
            .entry(question_id.to_string())
            .or_default()
            .extend(results);
    }

    pub fn script_submit(&self, results: Vec<Result<(), GatewayError>>) {
        self.submits.lock().unwrap().extend(results);
    }

    /// The next save of `question_id` stays in flight until the returned
    /// notify is triggered.
    pub fn hold(&self, question_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(question_id.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn saves_of(&self, question_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Save { question_id: q, value } if q == question_id => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn submissions(&self) -> Vec<Vec<SubmittedAnswer>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit { answers } => Some(answers),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PersistenceGateway for ScriptedGateway {
    async fn save_answer(
        &self,
        _attempt_id: &str,
        question_id: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(Call::Save {
            question_id: question_id.to_string(),
            value: value.to_string(),
        });
        let gate = self.gates.lock().unwrap().remove(question_id);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = self
            .saves
            .lock()
            .unwrap()
            .get_mut(question_id)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or(Ok(()))
    }

    async fn submit_attempt(
        &self,
        _attempt_id: &str,
        answers: &[SubmittedAnswer],
    ) -> Result<Receipt, GatewayError> {
        self.calls.lock().unwrap().push(Call::Submit {
            answers: answers.to_vec(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = self.submits.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(())).map(|()| Receipt {
            finalized_at: Utc::now(),
        })
    }
}

pub fn question(id: &str, kind: QuestionKind, order: i64) -> Question {
    Question {
        id: id.to_string(),
        kind,
        prompt: format!("Prompt for {}", id),
        options: (kind == QuestionKind::MultipleChoice)
            .then(|| vec!["A".to_string(), "B".to_string(), "C".to_string()]),
        code_template: None,
        marks: 1.0,
        order,
    }
}

/// Short-answer attempt with questions q1..qN.
pub fn attempt(questions: usize, duration_seconds: u64, timed: bool) -> Attempt {
    let questions: Vec<Question> = (1..=questions)
        .map(|i| question(&format!("q{}", i), QuestionKind::ShortAnswer, i as i64))
        .collect();
    Attempt {
        id: "attempt-1".to_string(),
        title: "Scenario".to_string(),
        total_marks: questions.len() as f64,
        questions,
        duration_seconds,
        time_limit_enabled: timed,
        source_hash: "sha256:test".to_string(),
    }
}

/// Deterministic backoff, no jitter, short delays.
pub fn config() -> SessionConfig {
    SessionConfig {
        autosave_interval_secs: 15,
        tick_interval_ms: 1000,
        warning_seconds: None,
        save_retry: RetrySettings {
            max_attempts: 5,
            base_backoff_ms: 100,
            max_backoff_ms: 1000,
            jitter_ms: 0,
        },
        submit_retry: RetrySettings {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 1000,
            jitter_ms: 0,
        },
        data_dir: None,
        log_file: None,
    }
}

/// Lets spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

pub fn autosave_statuses(events: &[SessionEvent]) -> Vec<AutosaveStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Autosave(s) => Some(*s),
            _ => None,
        })
        .collect()
}

pub fn submitted(pairs: &[(&str, &str)]) -> Vec<SubmittedAnswer> {
    pairs
        .iter()
        .map(|(q, v)| SubmittedAnswer {
            question_id: q.to_string(),
            value: v.to_string(),
        })
        .collect()
}
