//! Guaranteed rollback of cluster mutations.
//!
//! A [`RollbackGuard`] holds the inverse actions for the mutation phase of a
//! run. Inverses are registered before the forward action is attempted, so
//! a half-applied change is still undone. On exit they run in reverse
//! registration order, each exactly once:
//!
//! ```text
//! register(RemoveLabel)      apply label
//! register(DeleteProfile)    create profile ... converge ... delete profile
//! ─────────────── exit (Ok, Err or panic) ───────────────
//! DeleteProfile              not-found is fine
//! RemoveLabel                not-found is fine
//! ```
//!
//! Rollback is best-effort: a failing step is logged and reported, and the
//! next step still runs.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::HarnessError;
use crate::lifecycle::ProfileLifecycleManager;
use crate::model::ManifestRef;

/// An inverse action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackStep {
    /// Delete the profile created from a manifest.
    DeleteProfile { manifest: ManifestRef },

    /// Clear a label from a node.
    RemoveLabel { node: String, key: String },
}

impl fmt::Display for RollbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteProfile { manifest } => write!(f, "delete profile {manifest}"),
            Self::RemoveLabel { node, key } => write!(f, "remove label {key} from {node}"),
        }
    }
}

/// What rollback did.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Steps attempted, in execution order.
    pub attempted: Vec<RollbackStep>,

    /// Steps that failed for a reason other than "already absent".
    pub failures: Vec<HarnessError>,
}

impl RollbackReport {
    /// Returns true if every step succeeded or found nothing to undo.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scope guard running registered inverse actions on exit.
pub struct RollbackGuard {
    lifecycle: ProfileLifecycleManager,
    steps: Vec<RollbackStep>,
}

impl RollbackGuard {
    /// Create a guard with nothing registered.
    pub fn new(lifecycle: ProfileLifecycleManager) -> Self {
        Self {
            lifecycle,
            steps: Vec::new(),
        }
    }

    /// Register an inverse action. Later registrations run first.
    pub fn register(&mut self, step: RollbackStep) {
        debug!(step = %step, "Registered rollback step");
        self.steps.push(step);
    }

    /// Number of registered steps not yet executed.
    pub fn pending(&self) -> usize {
        self.steps.len()
    }

    /// Run `forward`, then roll back no matter how it ended.
    ///
    /// If `forward` panics the rollback still runs and the panic is resumed
    /// afterwards.
    pub async fn protect<T, F>(self, forward: F) -> (Result<T, HarnessError>, RollbackReport)
    where
        F: Future<Output = Result<T, HarnessError>>,
    {
        let outcome = AssertUnwindSafe(forward).catch_unwind().await;
        let report = self.unwind().await;

        match outcome {
            Ok(result) => (result, report),
            Err(panic) => {
                error!(
                    attempted = report.attempted.len(),
                    failed = report.failures.len(),
                    "Forward sequence panicked, rollback finished; resuming panic"
                );
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Execute every registered step in reverse order.
    pub async fn unwind(mut self) -> RollbackReport {
        let steps = std::mem::take(&mut self.steps);
        let mut report = RollbackReport::default();

        info!(steps = steps.len(), "Rolling back cluster changes");

        for step in steps.into_iter().rev() {
            let result = match &step {
                RollbackStep::DeleteProfile { manifest } => {
                    self.lifecycle.delete_profile(manifest).await
                }
                RollbackStep::RemoveLabel { node, key } => {
                    self.lifecycle.remove_label(node, key).await
                }
            };

            match result {
                Ok(()) => debug!(step = %step, "Rollback step done"),
                Err(e) if e.is_not_found() => {
                    debug!(step = %step, "Nothing to roll back, already absent");
                }
                Err(e) => {
                    warn!(step = %step, error = %e, "Rollback step failed; cluster state may drift");
                    report.failures.push(e);
                }
            }
            report.attempted.push(step);
        }

        report
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            let pending: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
            warn!(
                pending = ?pending,
                "Rollback guard dropped without unwinding; cluster state may drift"
            );
        }
    }
}
