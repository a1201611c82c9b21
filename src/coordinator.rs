use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::autosave::AutosavePump;
use crate::buffer::{AnswerBuffer, Snapshot};
use crate::clock::SessionClock;
use crate::error::{GatewayError, SealReason, SessionError};
use crate::gateway::PersistenceGateway;
use crate::model::{Attempt, Receipt, SessionEvent, SubmissionState};
use crate::navigation::NavigationController;
use crate::retry::{retry_transient, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Manual,
    Expiry,
    Retry,
}

#[derive(Debug)]
struct CoordinatorInner {
    state: SubmissionState,
    confirmation_pending: bool,
    preserved: Option<Snapshot>,
    receipt: Option<Receipt>,
    last_error: Option<String>,
}

/// Owns the transition out of `Active` and guarantees that an attempt is
/// finalized once. Every entry point checks and moves the state under one
/// lock, so a manual submit racing a clock expiry yields a single
/// `submit_attempt` call.
pub struct SubmissionCoordinator {
    attempt: Arc<Attempt>,
    buffer: Arc<AnswerBuffer>,
    pump: Arc<AutosavePump>,
    clock: Arc<SessionClock>,
    navigation: Arc<Mutex<NavigationController>>,
    gateway: Arc<dyn PersistenceGateway>,
    retry: RetryConfig,
    inner: Mutex<CoordinatorInner>,
    events: broadcast::Sender<SessionEvent>,
}

impl SubmissionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempt: Arc<Attempt>,
        buffer: Arc<AnswerBuffer>,
        pump: Arc<AutosavePump>,
        clock: Arc<SessionClock>,
        navigation: Arc<Mutex<NavigationController>>,
        gateway: Arc<dyn PersistenceGateway>,
        retry: RetryConfig,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            attempt,
            buffer,
            pump,
            clock,
            navigation,
            gateway,
            retry,
            inner: Mutex::new(CoordinatorInner {
                state: SubmissionState::Active,
                confirmation_pending: false,
                preserved: None,
                receipt: None,
                last_error: None,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state
    }

    pub fn confirmation_pending(&self) -> bool {
        self.lock().confirmation_pending
    }

    pub fn receipt(&self) -> Option<Receipt> {
        self.lock().receipt.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Snapshot kept from a failed submission, reused by the next retry.
    pub fn preserved_snapshot(&self) -> Option<Snapshot> {
        self.lock().preserved.clone()
    }

    /// Asks for confirmation. Returns false (and does nothing) unless active.
    pub fn request_manual_submit(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != SubmissionState::Active {
            return false;
        }
        if !inner.confirmation_pending {
            inner.confirmation_pending = true;
            let _ = self.events.send(SessionEvent::ConfirmationRequested);
        }
        true
    }

    pub fn cancel_confirmation(&self) {
        let mut inner = self.lock();
        if inner.confirmation_pending {
            inner.confirmation_pending = false;
            let _ = self.events.send(SessionEvent::ConfirmationCancelled);
        }
    }

    pub async fn confirm_submit(&self) -> SubmissionState {
        {
            let mut inner = self.lock();
            if !inner.confirmation_pending || inner.state != SubmissionState::Active {
                return inner.state;
            }
            inner.confirmation_pending = false;
        }
        self.finalize(Trigger::Manual).await
    }

    pub async fn on_clock_expired(&self) -> SubmissionState {
        if !self.attempt.time_limit_enabled {
            debug!("clock expiry ignored for untimed attempt");
            return self.state();
        }
        self.finalize(Trigger::Expiry).await
    }

    pub async fn retry_submission(&self) -> Result<SubmissionState, SessionError> {
        if !self.begin(Trigger::Retry) {
            return Err(SessionError::NotRetryable(self.state()));
        }
        Ok(self.submit().await)
    }

    async fn finalize(&self, trigger: Trigger) -> SubmissionState {
        if !self.begin(trigger) {
            return self.state();
        }
        self.submit().await
    }

    /// Checks the entry condition and moves to `Submitting` in one step.
    /// The clock is cancelled and the buffer sealed before any network call.
    fn begin(&self, trigger: Trigger) -> bool {
        let mut inner = self.lock();
        let allowed = match trigger {
            Trigger::Retry => inner.state == SubmissionState::Failed,
            Trigger::Manual | Trigger::Expiry => inner.state == SubmissionState::Active,
        };
        if !allowed {
            debug!(?trigger, state = ?inner.state, "finalize skipped");
            return false;
        }

        self.clock.cancel();
        self.buffer.seal(if trigger == Trigger::Expiry {
            SealReason::Expired
        } else {
            SealReason::Finalizing
        });
        inner.state = SubmissionState::Submitting;
        inner.confirmation_pending = false;
        let _ = self
            .events
            .send(SessionEvent::Submission(SubmissionState::Submitting));
        info!(attempt_id = %self.attempt.id, ?trigger, "submitting attempt");
        true
    }

    async fn submit(&self) -> SubmissionState {
        self.pump.stop_periodic();
        self.pump.flush_all().await;

        let preserved = self.lock().preserved.clone();
        let snapshot = preserved.unwrap_or_else(|| self.buffer.snapshot_all());
        let payload = snapshot.to_submission();

        let gateway = &self.gateway;
        let attempt_id = self.attempt.id.as_str();
        let result = retry_transient(&self.retry, "submit_attempt", || {
            gateway.submit_attempt(attempt_id, &payload)
        })
        .await;

        match result {
            Ok(receipt) => self.complete(receipt),
            Err(GatewayError::AlreadySubmitted) => {
                info!(attempt_id, "attempt already recorded remotely; treating as submitted");
                self.complete(Receipt {
                    finalized_at: Utc::now(),
                })
            }
            Err(e) => self.fail(snapshot, e),
        }
    }

    fn complete(&self, receipt: Receipt) -> SubmissionState {
        let mut inner = self.lock();
        self.buffer.seal(SealReason::Submitted);
        self.navigation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .close();
        info!(
            attempt_id = %self.attempt.id,
            finalized_at = %receipt.finalized_at,
            "attempt submitted"
        );
        inner.state = SubmissionState::Submitted;
        inner.receipt = Some(receipt);
        inner.preserved = None;
        inner.last_error = None;
        let _ = self
            .events
            .send(SessionEvent::Submission(SubmissionState::Submitted));
        inner.state
    }

    fn fail(&self, snapshot: Snapshot, error: GatewayError) -> SubmissionState {
        let mut inner = self.lock();
        warn!(
            attempt_id = %self.attempt.id,
            error = %error,
            "submission failed; snapshot kept for retry"
        );
        inner.state = SubmissionState::Failed;
        inner.preserved = Some(snapshot);
        inner.last_error = Some(error.to_string());
        let _ = self
            .events
            .send(SessionEvent::Submission(SubmissionState::Failed));
        inner.state
    }
}
