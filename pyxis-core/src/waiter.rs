//! Waiter - Block until a remote entity converges on a target state
//!
//! A management API acknowledging an operation does not mean the operation is
//! complete: the entity settles asynchronously through a sequence of pending
//! states. `StateWaiter` probes the entity on a fixed cadence until it holds
//! the target state, enters a terminal failure state, or the timeout elapses.
//!
//! The probe is an injected closure performing exactly one remote read per
//! invocation; the waiter knows nothing about the API being polled.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default overall timeout for a wait session
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(40 * 60);

/// Default delay between consecutive probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Error returned by a probe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The remote entity does not exist
    #[error("entity not found")]
    NotFound,

    /// The read itself failed
    #[error(transparent)]
    Remote(Box<dyn std::error::Error + Send + Sync>),
}

impl ProbeError {
    pub fn remote(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Remote(Box::new(cause))
    }
}

/// Fatal outcome of a wait session
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("entity entered failure state {state:?}")]
    FailureState { state: String },

    #[error("unexpected state {state:?} while waiting for {target:?}")]
    UnexpectedState { state: String, target: String },

    #[error(
        "timed out after {waited:?} waiting for state {target:?} (last observed: {last_state:?})"
    )]
    Timeout {
        target: String,
        last_state: Option<String>,
        waited: Duration,
    },

    #[error("probe failed")]
    Probe(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("wait was cancelled")]
    Cancelled,
}

/// Successful outcome of a wait session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    /// The (normalized) state that satisfied the wait
    pub final_state: String,
    /// Number of probes performed during the session
    pub probes: u32,
}

/// Configuration for one wait session
///
/// All state labels are normalized to lowercase, both at construction and on
/// observation, so callers can mix the casings the remote API reports.
#[derive(Debug, Clone)]
pub struct StateWaiter {
    target: String,
    pending: HashSet<String>,
    failure: HashSet<String>,
    timeout: Duration,
    poll_interval: Duration,
    stability_count: u32,
    not_found_state: Option<String>,
}

impl StateWaiter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into().to_lowercase(),
            pending: HashSet::new(),
            failure: HashSet::new(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stability_count: 1,
            not_found_state: None,
        }
    }

    /// States considered "still settling"; any observed state outside
    /// pending, failure and the target is treated as a defect
    pub fn pending<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = states.into_iter().map(|s| s.into().to_lowercase()).collect();
        self
    }

    /// States that are definitionally terminal failures (never retried)
    pub fn failure<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure = states.into_iter().map(|s| s.into().to_lowercase()).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of consecutive target-state observations required before the
    /// wait succeeds. Guards against a transient flicker into the target
    /// state. Clamped to at least 1.
    pub fn stability_count(mut self, count: u32) -> Self {
        self.stability_count = count.max(1);
        self
    }

    /// Treat a `ProbeError::NotFound` as an observation of the given state
    /// label instead of a fatal error. This supports waiting for an entity's
    /// disappearance during deletion.
    pub fn on_not_found(mut self, state: impl Into<String>) -> Self {
        self.not_found_state = Some(state.into().to_lowercase());
        self
    }

    /// Probe until the target state has been observed `stability_count`
    /// consecutive times, a failure or unrecognized state is observed, the
    /// timeout elapses, or `cancel` fires.
    ///
    /// Probes are strictly sequential; the only suspension point between
    /// them is the fixed-interval sleep. Cancellation is observed during
    /// that sleep - a probe already in flight is not interrupted.
    pub async fn wait<F, Fut>(
        &self,
        mut probe: F,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ProbeError>>,
    {
        let started = Instant::now();
        let mut probes: u32 = 0;
        let mut consecutive: u32 = 0;
        let mut last_state: Option<String> = None;

        loop {
            if probes > 0 && started.elapsed() >= self.timeout {
                return Err(WaitError::Timeout {
                    target: self.target.clone(),
                    last_state,
                    waited: started.elapsed(),
                });
            }

            let observed = match probe().await {
                Ok(state) => state.to_lowercase(),
                Err(ProbeError::NotFound) => match &self.not_found_state {
                    Some(state) => state.clone(),
                    None => return Err(WaitError::Probe(Box::new(ProbeError::NotFound))),
                },
                Err(ProbeError::Remote(cause)) => return Err(WaitError::Probe(cause)),
            };
            probes += 1;

            if observed == self.target {
                consecutive += 1;
                log::debug!(
                    "observed target state {:?} ({}/{} consecutive)",
                    observed,
                    consecutive,
                    self.stability_count
                );
                if consecutive >= self.stability_count {
                    return Ok(WaitOutcome {
                        final_state: observed,
                        probes,
                    });
                }
            } else if self.failure.contains(&observed) {
                return Err(WaitError::FailureState { state: observed });
            } else if self.pending.contains(&observed) {
                log::debug!("observed pending state {:?}, continuing", observed);
                consecutive = 0;
            } else {
                return Err(WaitError::UnexpectedState {
                    state: observed,
                    target: self.target.clone(),
                });
            }
            last_state = Some(observed);

            tokio::select! {
                _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
