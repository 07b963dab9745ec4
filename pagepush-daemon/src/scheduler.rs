//! Debounce layer in front of the push engine.
//!
//! Each `schedule_push` cancels the pending timer and arms a new one, so a
//! burst of change signals produces a single push carrying the last message.
//! Once a timer fires it detaches itself from the scheduler before pushing;
//! a push that has started is never cancelled.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use pagepush_core::{PushAttempt, PushOutcome};
use pagepush_sync::GitSyncEngine;

/// Something that performs a (blocking) push.
pub trait PushRunner: Send + Sync + 'static {
    fn run_push(&self, message: &str) -> PushAttempt;
}

impl PushRunner for GitSyncEngine {
    fn run_push(&self, message: &str) -> PushAttempt {
        self.push(message)
    }
}

struct Pending {
    generation: u64,
    message: String,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Option<Pending>>,
    last_attempt: Mutex<Option<PushAttempt>>,
    /// Pushes running right now; a socket push can overlap a timer push.
    in_flight: AtomicUsize,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn last_attempt(&self) -> MutexGuard<'_, Option<PushAttempt>> {
        self.last_attempt.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// At most one outstanding scheduled push per scheduler.
pub struct PushScheduler {
    runner: Arc<dyn PushRunner>,
    quiet_period: Duration,
    generation: AtomicU64,
    shared: Arc<Shared>,
}

impl PushScheduler {
    pub fn new(runner: Arc<dyn PushRunner>, quiet_period: Duration) -> Self {
        Self {
            runner,
            quiet_period,
            generation: AtomicU64::new(0),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// (Re)arm the debounce timer with `message`. Must be called inside a
    /// tokio runtime.
    pub fn schedule_push(&self, message: impl Into<String>) {
        let message = message.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut pending = self.shared.pending();
        if let Some(previous) = pending.take() {
            previous.timer.abort();
            tracing::debug!(superseded = %previous.message, "pending push replaced");
        }

        let timer = tokio::spawn(fire_after(
            self.quiet_period,
            generation,
            Arc::clone(&self.runner),
            Arc::clone(&self.shared),
        ));
        tracing::info!(
            %message,
            quiet_secs = self.quiet_period.as_secs_f64(),
            "push scheduled",
        );
        *pending = Some(Pending {
            generation,
            message,
            timer,
        });
    }

    /// Push immediately, bypassing the debounce timer.
    pub async fn push_now(&self, message: impl Into<String>) -> PushAttempt {
        let message = message.into();
        run_blocking(Arc::clone(&self.runner), Arc::clone(&self.shared), message).await
    }

    /// Message of the push waiting for its quiet period, if any.
    pub fn pending_message(&self) -> Option<String> {
        self.shared.pending().as_ref().map(|p| p.message.clone())
    }

    pub fn is_push_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn last_attempt(&self) -> Option<PushAttempt> {
        self.shared.last_attempt().clone()
    }

    /// Push the pending message now instead of waiting out its quiet period.
    pub async fn flush(&self) -> Option<PushAttempt> {
        let pending = self.shared.pending().take()?;
        pending.timer.abort();
        Some(self.push_now(pending.message).await)
    }

    /// Drop the pending timer without pushing.
    pub fn cancel(&self) {
        if let Some(pending) = self.shared.pending().take() {
            pending.timer.abort();
        }
    }
}

impl Drop for PushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn fire_after(
    quiet_period: Duration,
    generation: u64,
    runner: Arc<dyn PushRunner>,
    shared: Arc<Shared>,
) {
    tokio::time::sleep(quiet_period).await;

    let message = {
        let mut pending = shared.pending();
        match pending.as_ref() {
            Some(p) if p.generation == generation => pending.take().map(|p| p.message),
            _ => None,
        }
    };
    let Some(message) = message else {
        return;
    };

    run_blocking(runner, shared, message).await;
}

async fn run_blocking(
    runner: Arc<dyn PushRunner>,
    shared: Arc<Shared>,
    message: String,
) -> PushAttempt {
    shared.in_flight.fetch_add(1, Ordering::SeqCst);
    let fallback = message.clone();
    let joined = tokio::task::spawn_blocking(move || runner.run_push(&message)).await;
    shared.in_flight.fetch_sub(1, Ordering::SeqCst);

    let attempt = match joined {
        Ok(attempt) => attempt,
        Err(err) => PushAttempt {
            attempt_number: 1,
            commit_message: fallback,
            started_at: Utc::now(),
            outcome: PushOutcome::FatalError {
                reason: format!("push task failed: {err}"),
            },
        },
    };

    tracing::info!(
        outcome = attempt.outcome.label(),
        message = %attempt.commit_message,
        "push finished",
    );
    *shared.last_attempt() = Some(attempt.clone());
    attempt
}
