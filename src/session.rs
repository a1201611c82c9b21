use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::autosave::AutosavePump;
use crate::buffer::AnswerBuffer;
use crate::clock::{ClockEvent, SessionClock};
use crate::config::SessionConfig;
use crate::coordinator::SubmissionCoordinator;
use crate::error::{SealReason, SessionError};
use crate::gateway::PersistenceGateway;
use crate::model::{Answer, Attempt, AutosaveStatus, SessionEvent, SubmissionState};
use crate::navigation::NavigationController;
use crate::store::StoreDocument;

const EVENT_CAPACITY: usize = 256;

/// Read-only projection handed to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub current_index: usize,
    pub current_question_id: String,
    pub time_remaining_seconds: u64,
    pub time_limit_enabled: bool,
    pub flagged: Vec<String>,
    pub autosave_status: AutosaveStatus,
    pub submission_state: SubmissionState,
    pub confirmation_pending: bool,
    pub finalized_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct SessionInner {
    attempt: Arc<Attempt>,
    buffer: Arc<AnswerBuffer>,
    pump: Arc<AutosavePump>,
    navigation: Arc<Mutex<NavigationController>>,
    clock: Arc<SessionClock>,
    coordinator: Arc<SubmissionCoordinator>,
    events: broadcast::Sender<SessionEvent>,
    autosave_interval: Duration,
    started_at: Mutex<Option<DateTime<Utc>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// One student's live attempt: the mutation entry points the UI may call,
/// wired to the clock, buffer, navigation, autosave and submission parts.
#[derive(Clone)]
pub struct AttemptSession {
    inner: Arc<SessionInner>,
}

impl AttemptSession {
    pub fn new(
        attempt: Attempt,
        gateway: Arc<dyn PersistenceGateway>,
        config: &SessionConfig,
    ) -> Self {
        let attempt = Arc::new(attempt);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let buffer = Arc::new(AnswerBuffer::new(&attempt));
        let pump = Arc::new(AutosavePump::new(
            attempt.id.clone(),
            Arc::clone(&buffer),
            Arc::clone(&gateway),
            config.save_retry(),
            events.clone(),
        ));
        let navigation = Arc::new(Mutex::new(NavigationController::new(
            &attempt,
            Arc::clone(&pump),
        )));
        let mut clock = SessionClock::new(config.tick_interval(), config.warning_seconds);
        if attempt.time_limit_enabled {
            // Edits stop at the deadline, not when the coordinator gets to it.
            let sealed = Arc::clone(&buffer);
            clock = clock.on_expiry(move || sealed.seal(SealReason::Expired));
        }
        let clock = Arc::new(clock);
        let coordinator = Arc::new(SubmissionCoordinator::new(
            Arc::clone(&attempt),
            Arc::clone(&buffer),
            Arc::clone(&pump),
            Arc::clone(&clock),
            Arc::clone(&navigation),
            gateway,
            config.submit_retry(),
            events.clone(),
        ));

        Self {
            inner: Arc::new(SessionInner {
                attempt,
                buffer,
                pump,
                navigation,
                clock,
                coordinator,
                events,
                autosave_interval: config.autosave_interval(),
                started_at: Mutex::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    fn navigation(&self) -> MutexGuard<'_, NavigationController> {
        self.inner
            .navigation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn attempt(&self) -> &Attempt {
        &self.inner.attempt
    }

    pub fn coordinator(&self) -> &Arc<SubmissionCoordinator> {
        &self.inner.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Seeds previously saved answers, position and flags. Call before `start`.
    pub fn resume(&self, doc: &StoreDocument) {
        let mut restored = 0usize;
        for (question_id, stored) in &doc.answers {
            match self
                .inner
                .buffer
                .restore(question_id, stored.value.clone(), Some(stored.saved_at))
            {
                Ok(()) => restored += 1,
                Err(e) => warn!(question_id = %question_id, error = %e, "skipping saved answer"),
            }
        }
        self.navigation()
            .restore(doc.progress.current_index, &doc.progress.flagged);
        if let Some(started) = doc.progress.started_at {
            *self.inner.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(started);
        }
        info!(restored, "session resumed");
    }

    /// Starts the countdown, the periodic autosave and the clock listener.
    pub fn start(&self) -> Result<(), SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.clock.start(self.countdown_budget(), tx)?;
        self.inner
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_or_insert_with(Utc::now);
        self.inner.pump.start_periodic(self.inner.autosave_interval);

        let handle = tokio::spawn(listen_clock(
            rx,
            Arc::clone(&self.inner.coordinator),
            self.inner.events.clone(),
        ));
        *self.inner.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        info!(
            attempt_id = %self.inner.attempt.id,
            questions = self.inner.attempt.len(),
            time_limit = self.inner.attempt.time_limit_enabled,
            "session started"
        );
        Ok(())
    }

    /// A resumed timed attempt keeps counting from its original start.
    fn countdown_budget(&self) -> u64 {
        let total = self.inner.attempt.duration_seconds;
        match self.started_at() {
            Some(started) if self.inner.attempt.time_limit_enabled => {
                let elapsed = (Utc::now() - started).num_seconds().max(0) as u64;
                total.saturating_sub(elapsed)
            }
            _ => total,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.started_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view(&self) -> SessionView {
        let (current_index, current_question_id, flagged) = {
            let nav = self.navigation();
            (
                nav.current_index(),
                nav.current_question_id().to_string(),
                nav.flagged(),
            )
        };
        let coordinator = &self.inner.coordinator;
        let clock = &self.inner.clock;
        // Before `start` the clock has no reading yet.
        let remaining = if !clock.is_running()
            && !clock.is_expired()
            && coordinator.state() == SubmissionState::Active
        {
            self.inner.attempt.duration_seconds
        } else {
            clock.remaining()
        };
        SessionView {
            current_index,
            current_question_id,
            time_remaining_seconds: remaining,
            time_limit_enabled: self.inner.attempt.time_limit_enabled,
            flagged,
            autosave_status: self.inner.pump.status(),
            submission_state: coordinator.state(),
            confirmation_pending: coordinator.confirmation_pending(),
            finalized_at: coordinator.receipt().map(|r| r.finalized_at),
            last_error: coordinator.last_error(),
        }
    }

    pub fn answer(&self, question_id: &str) -> Option<String> {
        self.inner.buffer.get(question_id)
    }

    pub fn answer_record(&self, question_id: &str) -> Option<Answer> {
        self.inner.buffer.answer(question_id)
    }

    pub fn is_dirty(&self, question_id: &str) -> bool {
        self.inner.buffer.is_dirty(question_id)
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.navigation().is_flagged(question_id)
    }

    pub fn is_visited(&self, question_id: &str) -> bool {
        self.navigation().is_visited(question_id)
    }

    pub fn is_saving(&self, question_id: &str) -> bool {
        self.inner.pump.is_saving(question_id)
    }

    pub fn set_answer(
        &self,
        question_id: &str,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.inner.buffer.set(question_id, value)
    }

    pub fn go_to(&self, index: usize) -> Result<usize, SessionError> {
        self.navigation().go_to(index)
    }

    pub fn next(&self) -> Result<usize, SessionError> {
        self.navigation().next()
    }

    pub fn previous(&self) -> Result<usize, SessionError> {
        self.navigation().previous()
    }

    pub fn toggle_flag(&self, question_id: &str) -> Result<bool, SessionError> {
        self.navigation().toggle_flag(question_id)
    }

    pub fn request_manual_submit(&self) -> bool {
        self.inner.coordinator.request_manual_submit()
    }

    pub fn cancel_submit(&self) {
        self.inner.coordinator.cancel_confirmation();
    }

    pub async fn confirm_submit(&self) -> SubmissionState {
        self.inner.coordinator.confirm_submit().await
    }

    pub async fn retry_submission(&self) -> Result<SubmissionState, SessionError> {
        self.inner.coordinator.retry_submission().await
    }

    /// Flushes unsaved answers without submitting, e.g. before quitting.
    pub async fn flush(&self) {
        self.inner.pump.flush_all().await;
    }

    /// Stops background work. Unsaved answers stay dirty in the buffer.
    pub fn shutdown(&self) {
        self.inner.clock.cancel();
        self.inner.pump.stop_periodic();
        if let Some(handle) = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

async fn listen_clock(
    mut rx: mpsc::UnboundedReceiver<ClockEvent>,
    coordinator: Arc<SubmissionCoordinator>,
    events: broadcast::Sender<SessionEvent>,
) {
    while let Some(event) = rx.recv().await {
        let expired = event == ClockEvent::Expired;
        let _ = events.send(SessionEvent::Clock(event));
        if expired {
            coordinator.on_clock_expired().await;
            return;
        }
    }
}
