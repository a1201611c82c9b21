use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::buffer::AnswerBuffer;
use crate::error::GatewayError;
use crate::gateway::PersistenceGateway;
use crate::model::{AutosaveStatus, SessionEvent};
use crate::retry::RetryConfig;

/// Per-question save tracking. `idle` is false from the moment a driver
/// claims the question until it has nothing left to send.
#[derive(Debug)]
struct Slot {
    in_flight: Option<String>,
    follow_up: bool,
    idle: watch::Sender<bool>,
}

impl Slot {
    fn new() -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            in_flight: None,
            follow_up: false,
            idle,
        }
    }

    fn is_busy(&self) -> bool {
        !*self.idle.borrow()
    }
}

enum SaveOutcome {
    Clean,
    Saved,
    Failed { value: String },
}

/// Keeps the remote store eventually consistent with the answer buffer.
///
/// At most one save per question is outstanding. Edits that land while a
/// save is in flight are picked up by the same driver once it completes,
/// always sending the latest buffered value.
pub struct AutosavePump {
    attempt_id: String,
    buffer: Arc<AnswerBuffer>,
    gateway: Arc<dyn PersistenceGateway>,
    retry: RetryConfig,
    slots: Mutex<HashMap<String, Slot>>,
    status: Mutex<AutosaveStatus>,
    events: broadcast::Sender<SessionEvent>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl AutosavePump {
    pub fn new(
        attempt_id: impl Into<String>,
        buffer: Arc<AnswerBuffer>,
        gateway: Arc<dyn PersistenceGateway>,
        retry: RetryConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            attempt_id: attempt_id.into(),
            buffer,
            gateway,
            retry,
            slots: Mutex::new(HashMap::new()),
            status: Mutex::new(AutosaveStatus::Idle),
            events,
            periodic: Mutex::new(None),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> AutosaveStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, next: AutosaveStatus) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if *status != next {
            *status = next;
            let _ = self.events.send(SessionEvent::Autosave(next));
        }
    }

    pub fn is_saving(&self, question_id: &str) -> bool {
        self.slots()
            .get(question_id)
            .map(|s| s.in_flight.is_some())
            .unwrap_or(false)
    }

    /// Fire-and-forget flush of one question, used on navigation.
    pub fn request_flush(self: &Arc<Self>, question_id: &str) {
        let _ = self.kick(question_id);
    }

    /// Ensures a driver is working on `question_id` if it has unsaved data,
    /// and returns a receiver that reports when the question goes idle.
    fn kick(self: &Arc<Self>, question_id: &str) -> watch::Receiver<bool> {
        let mut slots = self.slots();
        let slot = slots
            .entry(question_id.to_string())
            .or_insert_with(Slot::new);
        let idle = slot.idle.subscribe();

        if slot.is_busy() {
            slot.follow_up = true;
            debug!(question_id, "save in flight; edit coalesced into follow-up");
            return idle;
        }
        if !self.buffer.is_dirty(question_id) {
            return idle;
        }

        slot.idle.send_replace(false);
        drop(slots);

        let pump = Arc::clone(self);
        let question_id = question_id.to_string();
        tokio::spawn(async move { pump.drive(question_id).await });
        idle
    }

    async fn drive(self: Arc<Self>, question_id: String) {
        loop {
            let outcome = self.save_latest(&question_id).await;

            let again = {
                let mut slots = self.slots();
                let Some(slot) = slots.get_mut(&question_id) else {
                    return;
                };
                let follow_up = std::mem::take(&mut slot.follow_up);
                let again = match &outcome {
                    SaveOutcome::Clean => false,
                    SaveOutcome::Saved => self.buffer.is_dirty(&question_id),
                    // After a terminal failure only a genuinely newer edit
                    // earns another attempt; the periodic pass retries the rest.
                    SaveOutcome::Failed { value } => {
                        follow_up
                            && self
                                .buffer
                                .pending_value(&question_id)
                                .is_some_and(|latest| &latest != value)
                    }
                };
                if !again {
                    slot.idle.send_replace(true);
                }
                again
            };

            if !again {
                return;
            }
            debug!(question_id = %question_id, "sending follow-up save with latest value");
        }
    }

    /// Saves whatever the buffer holds for `question_id`, retrying transient
    /// failures. The value is re-read before every attempt.
    async fn save_latest(&self, question_id: &str) -> SaveOutcome {
        let mut attempt = 0u32;
        loop {
            let Some(value) = self.buffer.pending_value(question_id) else {
                return SaveOutcome::Clean;
            };

            attempt += 1;
            self.set_in_flight(question_id, Some(value.clone()));
            self.set_status(AutosaveStatus::Saving);
            debug!(
                attempt_id = %self.attempt_id,
                question_id,
                attempt,
                "saving answer"
            );

            let result = self
                .gateway
                .save_answer(&self.attempt_id, question_id, &value)
                .await;
            self.set_in_flight(question_id, None);

            match result {
                Ok(()) => {
                    let clean = self.buffer.mark_saved(question_id, &value, Utc::now());
                    debug!(question_id, clean, "answer saved");
                    if !self.any_in_flight() {
                        self.set_status(AutosaveStatus::Saved);
                    }
                    return SaveOutcome::Saved;
                }
                Err(GatewayError::Transient(msg)) => {
                    self.set_status(AutosaveStatus::Error);
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            question_id,
                            attempt,
                            error = %msg,
                            "autosave giving up for now; answer stays unsaved"
                        );
                        return SaveOutcome::Failed { value };
                    }
                    let wait = self.retry.backoff_for(attempt);
                    warn!(
                        question_id,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %msg,
                        "autosave failed, retrying"
                    );
                    time::sleep(wait).await;
                }
                Err(e) => {
                    self.set_status(AutosaveStatus::Error);
                    warn!(question_id, error = %e, "autosave rejected");
                    return SaveOutcome::Failed { value };
                }
            }
        }
    }

    fn set_in_flight(&self, question_id: &str, value: Option<String>) {
        if let Some(slot) = self.slots().get_mut(question_id) {
            slot.in_flight = value;
        }
    }

    fn any_in_flight(&self) -> bool {
        self.slots().values().any(|s| s.in_flight.is_some())
    }

    /// Flushes every dirty answer and waits until each flush it started,
    /// including coalesced follow-ups and saves already in flight, has settled.
    pub async fn flush_all(self: &Arc<Self>) {
        let dirty = self.buffer.dirty_ids();
        if !dirty.is_empty() {
            info!(count = dirty.len(), "flushing unsaved answers");
        }
        for id in &dirty {
            let _ = self.kick(id);
        }

        let waiters: Vec<watch::Receiver<bool>> = self
            .slots()
            .values()
            .map(|slot| slot.idle.subscribe())
            .collect();
        join_all(waiters.into_iter().map(|mut rx| async move {
            let _ = rx.wait_for(|idle| *idle).await;
        }))
        .await;
    }

    pub fn start_periodic(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(pump) = weak.upgrade() else {
                    return;
                };
                for id in pump.buffer.dirty_ids() {
                    pump.request_flush(&id);
                }
            }
        });
        if let Some(previous) = self
            .periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            previous.abort();
        }
    }

    pub fn stop_periodic(&self) {
        if let Some(handle) = self
            .periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for AutosavePump {
    fn drop(&mut self) {
        self.stop_periodic();
    }
}
