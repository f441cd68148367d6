//! Error types for the harness and its gateways.

use std::time::Duration;

use nodetune_reconcile::Sample;
use thiserror::Error;

use crate::model::{LabelAction, ManifestRef};

/// Errors reported by a cluster gateway or parameter reader.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The addressed object (resource, label, pod) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A cluster-management command exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The command could not be started at all.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time and was killed.
    #[error("`{command}` did not finish within {after:?}")]
    Timeout { command: String, after: Duration },

    /// The command succeeded but its output could not be understood.
    #[error("unexpected output from `{command}`: {message}")]
    Parse { command: String, message: String },
}

impl GatewayError {
    /// Returns true if the error means the object was already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Harness errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No node carries the requested role.
    #[error("no eligible target node with role {role:?}")]
    NoEligibleTarget { role: String },

    /// No agent pod is scheduled on the node.
    #[error("no agent pod found on node {node}")]
    AgentNotFound { node: String },

    /// More than one agent pod claims the node.
    #[error("{count} agent pods found on node {node}, expected exactly one")]
    AmbiguousAgent { node: String, count: usize },

    /// Listing nodes or pods failed.
    #[error("failed to query {what}: {source}")]
    InventoryQueryFailed {
        what: &'static str,
        #[source]
        source: GatewayError,
    },

    /// Single-shot parameter read failed.
    #[error("failed to read {parameter} from agent {agent}: {source}")]
    ReadError {
        agent: String,
        parameter: String,
        #[source]
        source: GatewayError,
    },

    /// The parameter did not reach the expected value in time.
    #[error(
        "{parameter} on agent {agent} did not reach {expected:?} within {budget:?} (last observed: {})",
        describe_last(.last)
    )]
    ConvergenceTimeout {
        agent: String,
        parameter: String,
        expected: String,
        budget: Duration,
        elapsed: Duration,
        last: Option<Sample<String, GatewayError>>,
    },

    /// Setting or clearing a node label failed.
    #[error("failed to {action} label {key} on node {node}: {source}")]
    LabelOperationFailed {
        node: String,
        key: String,
        action: LabelAction,
        #[source]
        source: GatewayError,
    },

    /// Creating the profile resource failed.
    #[error("failed to create profile from {manifest}: {source}")]
    ProfileCreateFailed {
        manifest: ManifestRef,
        #[source]
        source: GatewayError,
    },

    /// Deleting the profile resource failed.
    #[error("failed to delete profile from {manifest}: {source}")]
    ProfileDeleteFailed {
        manifest: ManifestRef,
        #[source]
        source: GatewayError,
    },

    /// The run itself passed but rollback could not restore every change.
    #[error("rollback incomplete, {} step(s) failed; cluster state may have drifted", .failures.len())]
    RollbackIncomplete { failures: Vec<HarnessError> },
}

impl HarnessError {
    /// Returns true if a mutation failed only because its target was already gone.
    ///
    /// Rollback treats these as success.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::LabelOperationFailed { source, .. } | Self::ProfileDeleteFailed { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Returns true for errors raised before any cluster mutation.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::NoEligibleTarget { .. }
                | Self::AgentNotFound { .. }
                | Self::AmbiguousAgent { .. }
                | Self::InventoryQueryFailed { .. }
                | Self::ReadError { .. }
        )
    }
}

fn describe_last(last: &Option<Sample<String, GatewayError>>) -> String {
    match last {
        Some(Sample::Value(v)) => format!("{v:?}"),
        Some(Sample::Error(e)) => format!("read error: {e}"),
        Some(Sample::Stalled(after)) => format!("read still pending after {after:?}"),
        None => "nothing".to_string(),
    }
}
