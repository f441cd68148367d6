//! Harness configuration.
//!
//! Everything the scenario needs is passed in explicitly; there is no
//! process-wide client or namespace. Values come from the environment with
//! defaults matching the stock hugepages example.

use std::time::Duration;

use anyhow::{Context, Result};
use nodetune_reconcile::{DEFAULT_CONVERGENCE_BUDGET, DEFAULT_POLL_INTERVAL};

use crate::command::{CommandGateway, DEFAULT_COMMAND_TIMEOUT};
use crate::model::{ManifestRef, ProfileSpec};

/// Namespace the tuning operator runs in when `WATCH_NAMESPACE` is unset.
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "openshift-cluster-node-tuning-operator";

/// Polling configuration for convergence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Interval between samples.
    pub interval: Duration,

    /// Budget for the profile to take effect.
    pub convergence_budget: Duration,

    /// Budget for the original value to come back.
    pub restore_budget: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            convergence_budget: DEFAULT_CONVERGENCE_BUDGET,
            restore_budget: DEFAULT_CONVERGENCE_BUDGET,
        }
    }
}

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Cluster CLI binary (`oc` or `kubectl`).
    pub cluster_cli: String,

    /// Namespace holding the profile resource and the agent pods.
    pub namespace: String,

    /// Role a target node must carry.
    pub role: String,

    /// Label key that the profile's match predicate selects on.
    pub label_key: String,

    /// Profile under test.
    pub profile: ProfileSpec,

    /// Label selector for agent pods.
    pub agent_selector: String,

    /// Polling configuration.
    pub poll: PollSettings,

    /// Cluster context passed as `--context`, if any.
    pub context: Option<String>,

    /// Deadline for each cluster CLI invocation.
    pub command_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cluster_cli: "oc".to_string(),
            namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            role: "worker".to_string(),
            label_key: "tuned.openshift.io/hugepages".to_string(),
            profile: ProfileSpec {
                manifest: ManifestRef::new("manifests/hugepages.yaml"),
                parameter: "vm.nr_hugepages".to_string(),
                value: "16".to_string(),
            },
            agent_selector: "openshift-app=tuned".to_string(),
            poll: PollSettings::default(),
            context: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let interval_ms = parse_u64(&lookup, "NODETUNE_POLL_INTERVAL_MS")?
            .map(|ms| ms.max(50))
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll.interval);

        let convergence_budget = parse_u64(&lookup, "NODETUNE_CONVERGENCE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll.convergence_budget);

        // Restoration shares the convergence budget unless told otherwise.
        let restore_budget = parse_u64(&lookup, "NODETUNE_RESTORE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(convergence_budget);

        let command_timeout = parse_u64(&lookup, "NODETUNE_COMMAND_TIMEOUT_SECS")?
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(defaults.command_timeout);

        Ok(Self {
            cluster_cli: lookup("NODETUNE_CLUSTER_CLI").unwrap_or(defaults.cluster_cli),
            namespace: lookup("WATCH_NAMESPACE")
                .filter(|ns| !ns.is_empty())
                .unwrap_or(defaults.namespace),
            role: lookup("NODETUNE_ROLE").unwrap_or(defaults.role),
            label_key: lookup("NODETUNE_LABEL").unwrap_or(defaults.label_key),
            profile: ProfileSpec {
                manifest: lookup("NODETUNE_MANIFEST")
                    .map(ManifestRef::new)
                    .unwrap_or(defaults.profile.manifest),
                parameter: lookup("NODETUNE_PARAMETER").unwrap_or(defaults.profile.parameter),
                value: lookup("NODETUNE_VALUE")
                    .map(|v| v.trim().to_string())
                    .unwrap_or(defaults.profile.value),
            },
            agent_selector: lookup("NODETUNE_AGENT_SELECTOR").unwrap_or(defaults.agent_selector),
            poll: PollSettings {
                interval: interval_ms,
                convergence_budget,
                restore_budget,
            },
            context: lookup("NODETUNE_CONTEXT").filter(|c| !c.is_empty()),
            command_timeout,
        })
    }

    /// Build the CLI-backed gateway this configuration describes.
    pub fn command_gateway(&self) -> CommandGateway {
        let leading: Vec<String> = match &self.context {
            Some(context) => vec!["--context".to_string(), context.clone()],
            None => Vec::new(),
        };
        CommandGateway::new(self.cluster_cli.clone())
            .with_leading_args(leading)
            .with_timeout(self.command_timeout)
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().parse::<u64>())
        .transpose()
        .with_context(|| format!("{key} must be a non-negative integer"))
}
