use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    Tick { remaining: u64 },
    Warning { remaining: u64 },
    Expired,
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const EXPIRED: u8 = 2;

#[derive(Debug)]
struct ClockShared {
    phase: AtomicU8,
    remaining: AtomicU64,
}

impl ClockShared {
    /// Running -> Expired. Only one caller can ever win this transition.
    fn claim_expiry(&self) -> bool {
        self.phase
            .compare_exchange(RUNNING, EXPIRED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn is_running(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == RUNNING
    }
}

/// Runs on the countdown task the instant expiry is claimed, before
/// `Expired` is sent.
pub type ExpiryHook = Box<dyn FnOnce() + Send + 'static>;

/// Countdown for one attempt. Owned per session, never global.
pub struct SessionClock {
    shared: Arc<ClockShared>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    expiry_hook: Mutex<Option<ExpiryHook>>,
    tick_interval: Duration,
    warn_at: Option<u64>,
}

impl SessionClock {
    pub fn new(tick_interval: Duration, warn_at: Option<u64>) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                phase: AtomicU8::new(RUNNING),
                remaining: AtomicU64::new(0),
            }),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
            expiry_hook: Mutex::new(None),
            tick_interval,
            warn_at,
        }
    }

    pub fn on_expiry(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.expiry_hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
        self
    }

    pub fn start(
        &self,
        duration_seconds: u64,
        events: mpsc::UnboundedSender<ClockEvent>,
    ) -> Result<(), SessionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted);
        }
        self.shared
            .remaining
            .store(duration_seconds, Ordering::SeqCst);
        if !self.shared.is_running() {
            // Cancelled before it ever started.
            return Ok(());
        }

        info!(duration_seconds, "session clock started");
        let hook = self
            .expiry_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let handle = tokio::spawn(run_countdown(
            Arc::clone(&self.shared),
            Duration::from_secs(duration_seconds),
            self.tick_interval,
            self.warn_at,
            hook,
            events,
        ));
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stops ticking. Safe to call any number of times, before or after expiry.
    pub fn cancel(&self) {
        let was_running = self
            .shared
            .phase
            .compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        if was_running {
            debug!(
                remaining = self.remaining(),
                "session clock cancelled"
            );
        }
    }

    pub fn remaining(&self) -> u64 {
        self.shared.remaining.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.shared.phase.load(Ordering::SeqCst) == EXPIRED
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && self.shared.is_running()
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

async fn run_countdown(
    shared: Arc<ClockShared>,
    duration: Duration,
    tick_interval: Duration,
    warn_at: Option<u64>,
    hook: Option<ExpiryHook>,
    events: mpsc::UnboundedSender<ClockEvent>,
) {
    let deadline = Instant::now() + duration;
    let mut ticker = time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut warned = false;

    if duration.is_zero() {
        expire(&shared, hook, &events);
        return;
    }

    loop {
        ticker.tick().await;
        if !shared.is_running() {
            return;
        }

        let remaining = ceil_secs(deadline.saturating_duration_since(Instant::now()));
        shared.remaining.store(remaining, Ordering::SeqCst);

        if remaining == 0 {
            expire(&shared, hook, &events);
            return;
        }

        if let Some(threshold) = warn_at {
            if !warned && remaining <= threshold {
                warned = true;
                let _ = events.send(ClockEvent::Warning { remaining });
            }
        }

        if events.send(ClockEvent::Tick { remaining }).is_err() {
            return;
        }
    }
}

fn expire(
    shared: &ClockShared,
    hook: Option<ExpiryHook>,
    events: &mpsc::UnboundedSender<ClockEvent>,
) {
    if !shared.claim_expiry() {
        return;
    }
    info!("session clock expired");
    if let Some(hook) = hook {
        hook();
    }
    let _ = events.send(ClockEvent::Expired);
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(61), "1m 01s");
        assert_eq!(format_duration(3723), "1h 02m 03s");
    }

    #[test]
    fn rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(0)), 0);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1000)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
    }
}
