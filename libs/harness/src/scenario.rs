//! The custom-profile-via-node-label scenario.
//!
//! Setup (no mutations, no rollback):
//! 1. Select a node with the configured role
//! 2. Locate the agent pod on that node
//! 3. Read the baseline value of the parameter
//!
//! Mutation phase (guarded, always rolled back):
//! 4. Label the node
//! 5. Create the profile
//! 6. Wait for the parameter to reach the profile value
//! 7. Delete the profile
//! 8. Wait for the parameter to return to the baseline
//!
//! Rollback: delete profile, then remove label.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::gateway::{ClusterGateway, ParameterReader};
use crate::lifecycle::ProfileLifecycleManager;
use crate::model::{Agent, Mutation, MutationRecord, Node, ProfileSpec};
use crate::observer::ConvergenceObserver;
use crate::rollback::{RollbackGuard, RollbackReport, RollbackStep};
use crate::selector::{AgentLocator, NodeSelector};

/// Outcome of one scenario run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Selected node.
    pub node: Option<String>,

    /// Agent pod on the selected node.
    pub agent: Option<String>,

    /// Parameter value before any change.
    pub baseline: Option<String>,

    /// Value observed once the profile took effect.
    pub applied: Option<String>,

    /// Value observed after the profile was deleted.
    pub restored: Option<String>,

    /// First error of the run, if any.
    pub error: Option<HarnessError>,

    /// Rollback outcome. `None` when the run never reached the mutation phase.
    pub rollback: Option<RollbackReport>,

    /// Every mutation that went through, forward and inverse.
    pub mutations: Vec<Mutation>,
}

impl RunReport {
    /// Returns true if the run passed and rollback left nothing behind.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.rollback.as_ref().map_or(true, RollbackReport::is_clean)
    }

    /// Collapse the report into a single result.
    ///
    /// A run error takes precedence; a clean run with a dirty rollback yields
    /// [`HarnessError::RollbackIncomplete`].
    pub fn into_result(self) -> Result<(), HarnessError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        match self.rollback {
            Some(rollback) if !rollback.is_clean() => Err(HarnessError::RollbackIncomplete {
                failures: rollback.failures,
            }),
            _ => Ok(()),
        }
    }

    /// JSON rendering for machine consumption.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "success": self.is_success(),
            "node": self.node,
            "agent": self.agent,
            "baseline": self.baseline,
            "applied": self.applied,
            "restored": self.restored,
            "error": self.error.as_ref().map(ToString::to_string),
            "rollback": self.rollback.as_ref().map(|r| json!({
                "attempted": r.attempted,
                "failures": r.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })),
            "mutations": self.mutations,
        })
    }
}

/// Everything resolved during setup.
struct Target {
    node: Node,
    agent: Agent,
    baseline: String,
}

/// Wires the components together for one run.
pub struct Scenario {
    selector: NodeSelector,
    locator: AgentLocator,
    observer: ConvergenceObserver,
    lifecycle: ProfileLifecycleManager,
    role: String,
    label_key: String,
    profile: ProfileSpec,
    convergence_budget: Duration,
    restore_budget: Duration,
}

impl Scenario {
    /// Build a scenario from configuration and the two external collaborators.
    pub fn new(
        config: &HarnessConfig,
        gateway: Arc<dyn ClusterGateway>,
        reader: Arc<dyn ParameterReader>,
    ) -> Self {
        Self {
            selector: NodeSelector::new(Arc::clone(&gateway)),
            locator: AgentLocator::new(
                Arc::clone(&gateway),
                config.namespace.clone(),
                config.agent_selector.clone(),
            ),
            observer: ConvergenceObserver::new(reader, config.poll.interval),
            lifecycle: ProfileLifecycleManager::new(gateway, config.namespace.clone()),
            role: config.role.clone(),
            label_key: config.label_key.clone(),
            profile: config.profile.clone(),
            convergence_budget: config.poll.convergence_budget,
            restore_budget: config.poll.restore_budget,
        }
    }

    /// Handle to the mutation log shared with the lifecycle manager.
    pub fn mutations(&self) -> MutationRecord {
        self.lifecycle.record()
    }

    /// Run the full scenario.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();

        let target = match self.prepare(&mut report).await {
            Ok(target) => target,
            Err(e) => {
                error!(error = %e, "Setup failed, nothing to roll back");
                report.error = Some(e);
                report.mutations = self.lifecycle.record().snapshot();
                return report;
            }
        };

        let mut guard = RollbackGuard::new(self.lifecycle.clone());
        guard.register(RollbackStep::RemoveLabel {
            node: target.node.name.clone(),
            key: self.label_key.clone(),
        });
        guard.register(RollbackStep::DeleteProfile {
            manifest: self.profile.manifest.clone(),
        });

        let (outcome, rollback) = guard.protect(self.exercise(&target, &mut report)).await;

        if let Err(e) = outcome {
            error!(node = %target.node.name, error = %e, "Scenario failed");
            report.error = Some(e);
        }
        if !rollback.is_clean() {
            warn!(
                failures = rollback.failures.len(),
                "Rollback incomplete; cluster state may have drifted"
            );
        }

        report.rollback = Some(rollback);
        report.mutations = self.lifecycle.record().snapshot();

        if report.is_success() {
            info!(node = %target.node.name, "Scenario passed");
        }
        report
    }

    /// Undo the scenario's changes on `node` without running it.
    ///
    /// Used to recover a cluster after an interrupted run.
    pub async fn cleanup(&self, node: &str) -> RollbackReport {
        let mut guard = RollbackGuard::new(self.lifecycle.clone());
        guard.register(RollbackStep::RemoveLabel {
            node: node.to_string(),
            key: self.label_key.clone(),
        });
        guard.register(RollbackStep::DeleteProfile {
            manifest: self.profile.manifest.clone(),
        });
        guard.unwind().await
    }

    async fn prepare(&self, report: &mut RunReport) -> Result<Target, HarnessError> {
        let node = self.selector.select(&self.role).await?;
        report.node = Some(node.name.clone());

        let agent = self.locator.locate(&node).await?;
        report.agent = Some(agent.name.clone());

        let baseline = self.observer.read(&agent, &self.profile.parameter).await?;
        info!(
            agent = %agent.name,
            parameter = %self.profile.parameter,
            baseline = %baseline,
            "Captured baseline value"
        );
        report.baseline = Some(baseline.clone());

        Ok(Target {
            node,
            agent,
            baseline,
        })
    }

    async fn exercise(&self, target: &Target, report: &mut RunReport) -> Result<(), HarnessError> {
        let parameter = &self.profile.parameter;

        // Label first so the profile matches the node as soon as it appears.
        self.lifecycle
            .apply_label(&target.node.name, &self.label_key)
            .await?;
        self.lifecycle.create_profile(&self.profile.manifest).await?;

        let applied = self
            .observer
            .await_value(
                &target.agent,
                parameter,
                &self.profile.value,
                self.convergence_budget,
            )
            .await?;
        report.applied = Some(applied);

        self.lifecycle.delete_profile(&self.profile.manifest).await?;

        let restored = self
            .observer
            .await_value(
                &target.agent,
                parameter,
                &target.baseline,
                self.restore_budget,
            )
            .await?;
        report.restored = Some(restored);

        Ok(())
    }
}
