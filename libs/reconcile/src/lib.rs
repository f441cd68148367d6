//! Convergence polling primitives.
//!
//! This library provides the bounded polling loop used to wait for an
//! external system to reach an expected state. Key concepts:
//!
//! - **Sample**: One observation of the external system (a value or a read error).
//! - **Acceptance**: A predicate deciding whether a value means "converged".
//! - **Budget**: The total time allowed before giving up.
//!
//! # Invariants
//!
//! - The first sample is taken immediately; later samples follow a fixed interval
//! - A read error never ends the loop early, it only counts as "not yet converged"
//! - A timeout is reported no earlier than the budget and no later than
//!   budget + one interval
//! - The last sample (value or error) is handed back on timeout

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Convergence status of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Observed value matches the expectation.
    Converged,

    /// Observed value does not match yet.
    Converging,

    /// Status is unknown (the read failed).
    Unknown,
}

impl ConvergenceStatus {
    /// Returns true if the sample has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Returns true if the sample could be read but did not match.
    pub fn is_converging(&self) -> bool {
        matches!(self, Self::Converging)
    }
}

/// The most recent observation made by [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample<T, E> {
    /// The read returned a value.
    Value(T),

    /// The read failed.
    Error(E),

    /// The read did not return within the given window and was abandoned.
    Stalled(Duration),
}

impl<T, E> Sample<T, E> {
    /// Returns the observed value, if the sample was a successful read.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the read error, if the sample was a failed read.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if the read was abandoned.
    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled(_))
    }
}

/// Successful outcome of [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged<T> {
    /// The accepted value.
    pub value: T,

    /// Time spent polling.
    pub elapsed: Duration,

    /// Number of samples taken, including the accepted one.
    pub attempts: u32,
}

/// The budget ran out before an accepted value was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimeout<T, E> {
    /// Time spent polling.
    pub elapsed: Duration,

    /// Number of samples taken.
    pub attempts: u32,

    /// The final sample. Always present since at least one read happens.
    pub last: Option<Sample<T, E>>,
}

/// Poll `read` until `accept` returns true or `budget` is exhausted.
///
/// Sleeps `interval` between samples. The last sleep is clipped to the
/// remaining budget so the final sample lands on the deadline. A single read
/// may run for at most the remaining budget plus one interval; a read that
/// takes longer is dropped and recorded as [`Sample::Stalled`].
pub async fn poll_until<T, E, R, Fut, P>(
    mut read: R,
    accept: P,
    interval: Duration,
    budget: Duration,
) -> Result<Converged<T>, PollTimeout<T, E>>
where
    R: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    let mut last = None;

    loop {
        attempts += 1;

        let window = budget.saturating_sub(start.elapsed()) + interval;
        let sample = match tokio::time::timeout(window, read()).await {
            Ok(Ok(value)) => Sample::Value(value),
            Ok(Err(err)) => Sample::Error(err),
            Err(_) => Sample::Stalled(window),
        };

        let status = match &sample {
            Sample::Value(value) if accept(value) => ConvergenceStatus::Converged,
            Sample::Value(_) => ConvergenceStatus::Converging,
            Sample::Error(_) | Sample::Stalled(_) => ConvergenceStatus::Unknown,
        };

        let elapsed = start.elapsed();
        debug!(attempts, ?status, elapsed_ms = elapsed.as_millis() as u64, "Sampled");

        match sample {
            Sample::Value(value) if status.is_converged() => {
                return Ok(Converged {
                    value,
                    elapsed,
                    attempts,
                });
            }
            sample => last = Some(sample),
        }

        if elapsed >= budget {
            return Err(PollTimeout {
                elapsed,
                attempts,
                last,
            });
        }

        tokio::time::sleep(interval.min(budget - elapsed)).await;
    }
}

/// Default interval between samples.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time budget for a convergence check.
pub const DEFAULT_CONVERGENCE_BUDGET: Duration = Duration::from_secs(5 * 60); // 5 minutes
