//! Per-provider build state machine.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::{ChangeFeed, TaskError, TaskSnapshot, TaskStatus};
use crate::metrics;
use crate::provider::Provider;

/// Build state of one provider.
///
/// Created once at startup and shared between the provider's builder (the
/// only writer) and the status server (reader). Each instance has its own
/// lock, so one provider never blocks another.
///
/// Transitions:
/// - `Ready | Error -> InProgress` on [`start`](Self::start)
/// - `InProgress -> Ready` on [`complete`](Self::complete) or [`reset`](Self::reset)
/// - `InProgress -> Error` on [`fail`](Self::fail)
/// - `Error -> Ready` on [`reset`](Self::reset)
#[derive(Debug)]
pub struct ComponentTaskState {
    provider: Provider,
    inner: Mutex<TaskSnapshot>,
    feed: ChangeFeed,
}

impl ComponentTaskState {
    pub fn new(provider: Provider, feed: ChangeFeed) -> Self {
        Self {
            provider,
            inner: Mutex::new(TaskSnapshot::idle(provider)),
            feed,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn lock(&self) -> MutexGuard<'_, TaskSnapshot> {
        // The snapshot is plain data and stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a mutation and publish the result if it changed anything.
    fn update<R>(&self, f: impl FnOnce(&mut TaskSnapshot) -> (bool, R)) -> R {
        let (changed, result, snapshot) = {
            let mut state = self.lock();
            let (changed, result) = f(&mut state);
            (changed, result, state.clone())
        };
        if changed {
            metrics::TASK_TRANSITIONS
                .with_label_values(&[self.provider.as_str(), snapshot.status.as_str()])
                .inc();
            self.feed.publish(snapshot);
        }
        result
    }

    /// Current state.
    pub fn snapshot(&self) -> TaskSnapshot {
        self.lock().clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.lock().status
    }

    /// Begin a build attempt.
    ///
    /// Resets progress, clears a retained failure reason and returns the
    /// attempt number. Fails without touching any state if a build is
    /// already in progress.
    pub fn start(&self, label: &str) -> Result<u64, TaskError> {
        self.update(|state| {
            if state.status == TaskStatus::InProgress {
                return (
                    false,
                    Err(TaskError::AlreadyInProgress {
                        provider: self.provider,
                        current_build: state.current_build.clone(),
                    }),
                );
            }

            state.status = TaskStatus::InProgress;
            state.progress = 0;
            state.current_build = label.to_string();
            state.last_error = None;
            state.attempt += 1;
            info!(provider = %self.provider, attempt = state.attempt, "Build started: {}", label);
            (true, Ok(state.attempt))
        })
    }

    /// Replace the label of the running build.
    pub fn set_current_build(&self, label: &str) {
        self.update(|state| {
            if state.status != TaskStatus::InProgress {
                warn!(provider = %self.provider, "Ignoring label change while {:?}", state.status);
                return (false, ());
            }
            let changed = state.current_build != label;
            state.current_build = label.to_string();
            (changed, ())
        })
    }

    /// Add to the progress of the running build, clamped at 100.
    pub fn advance_progress(&self, delta: u32) {
        self.update(|state| {
            if state.status != TaskStatus::InProgress {
                warn!(
                    provider = %self.provider,
                    "Progress update of {} while {:?}; ignored",
                    delta,
                    state.status
                );
                return (false, ());
            }
            let next = (u32::from(state.progress) + delta).min(100) as u8;
            let changed = next != state.progress;
            state.progress = next;
            if changed {
                debug!(provider = %self.provider, "Progress {}%", next);
            }
            (changed, ())
        })
    }

    /// Finish the running build successfully.
    ///
    /// Progress is left where it is; only the next `start` zeroes it.
    pub fn complete(&self) {
        self.update(|state| {
            if state.status != TaskStatus::InProgress {
                warn!(provider = %self.provider, "Complete called while {:?}", state.status);
            }
            state.status = TaskStatus::Ready;
            state.current_build.clear();
            (true, ())
        })
    }

    /// Finish the running build with an error, retaining the reason.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|state| {
            warn!(provider = %self.provider, "Build failed: {}", reason);
            state.status = TaskStatus::Error;
            state.current_build.clear();
            state.last_error = Some(reason);
            (true, ())
        })
    }

    /// Return to Ready without recording a failure.
    ///
    /// Used for operator resets and for cancelled builds.
    pub fn reset(&self) {
        self.update(|state| {
            let changed = state.status != TaskStatus::Ready || !state.current_build.is_empty();
            state.status = TaskStatus::Ready;
            state.current_build.clear();
            state.last_error = None;
            (changed, ())
        })
    }
}
