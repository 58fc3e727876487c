//! Cancellation and time limits for collaborator calls.
//!
//! Collaborator traits are blocking calls that receive a [`CallContext`].
//! [`bounded_call`] runs one on a dedicated thread and waits for it in short
//! slices. When the per-call timeout expires or the run's [`CancelToken`]
//! fires, the context is aborted and the waiting worker gives the call up to
//! [`ABORT_GRACE`] to return before moving on. Implementations are expected to
//! watch the context (or pass [`CallContext::remaining`] on as a request
//! timeout), so an aborted call normally ends before the next tier starts.
//! A call that ignores its context is detached after the grace period and its
//! result dropped.

use crate::backends::BackendError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// How often a waiting worker re-checks the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long an aborted call may take to wind down before it is detached.
pub const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Cloneable flag shared by every task of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a collaborator sees of the call it is serving.
///
/// Aborted when the run is cancelled, when the deadline passes, or when the
/// waiting side gives up on the call.
#[derive(Debug, Clone)]
pub struct CallContext {
    run: CancelToken,
    abandoned: CancelToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never aborted, for calls made outside a pipeline run.
    pub fn unbounded() -> Self {
        Self::new(CancelToken::new(), None)
    }

    pub fn new(run: CancelToken, timeout: Option<Duration>) -> Self {
        Self {
            run,
            abandoned: CancelToken::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.run.is_cancelled()
            || self.abandoned.is_cancelled()
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `Err(BackendError::Aborted)` once the call has been aborted.
    pub fn check(&self) -> Result<(), BackendError> {
        if self.is_aborted() {
            Err(BackendError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early when the call is aborted.
    pub fn sleep(&self, duration: Duration) -> Result<(), BackendError> {
        let until = Instant::now() + duration;
        loop {
            self.check()?;
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            std::thread::sleep(left.min(POLL_INTERVAL));
        }
    }

    fn abandon(&self) {
        self.abandoned.cancel();
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("{0}")]
    Backend(#[from] BackendError),
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Cancelled")]
    Cancelled,
    #[error("Collaborator panicked: {0}")]
    Panicked(String),
    #[error("Could not start worker thread: {0}")]
    Spawn(String),
}

type Outcome<T> = std::thread::Result<Result<T, BackendError>>;

/// Run `call` on its own thread, bounded by `timeout` and `cancel`.
///
/// `label` names the thread (visible in panic messages and debuggers).
pub fn bounded_call<T, F>(
    label: &str,
    timeout: Option<Duration>,
    cancel: &CancelToken,
    call: F,
) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnOnce(&CallContext) -> Result<T, BackendError> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(CallError::Cancelled);
    }

    let ctx = CallContext::new(cancel.clone(), timeout);
    let worker_ctx = ctx.clone();
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name(format!("call-{label}"))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(&worker_ctx)));
            // The receiver is gone when the call was detached.
            let _ = tx.send(outcome);
        })
        .map_err(|e| CallError::Spawn(e.to_string()))?;

    let started = Instant::now();
    loop {
        let wait = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    abort(label, &ctx, &rx);
                    return Err(CallError::TimedOut(limit));
                }
                remaining.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };

        match rx.recv_timeout(wait) {
            Ok(outcome) => return settle(outcome, timeout, cancel),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    abort(label, &ctx, &rx);
                    return Err(CallError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CallError::Panicked(
                    "worker exited without a result".into(),
                ));
            }
        }
    }
}

/// A collaborator that noticed its own deadline or the run's cancellation
/// reports it the same way as the waiting side would have.
fn settle<T>(
    outcome: Outcome<T>,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<T, CallError> {
    match outcome {
        Ok(Err(BackendError::Aborted)) if cancel.is_cancelled() => Err(CallError::Cancelled),
        Ok(Err(BackendError::Aborted)) => Err(timeout.map_or(
            CallError::Backend(BackendError::Aborted),
            CallError::TimedOut,
        )),
        Ok(result) => result.map_err(CallError::Backend),
        Err(payload) => Err(CallError::Panicked(panic_message(&*payload))),
    }
}

/// Signal the call to stop and wait for it to return, up to [`ABORT_GRACE`].
/// Whatever it returns is discarded.
fn abort<T>(label: &str, ctx: &CallContext, rx: &Receiver<Outcome<T>>) {
    ctx.abandon();
    if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(ABORT_GRACE) {
        warn!(
            call = label,
            grace_ms = ABORT_GRACE.as_millis() as u64,
            "collaborator ignored abort; detaching its thread"
        );
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
