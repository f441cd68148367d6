//! Full scenario run.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use nodetune_harness::{HarnessConfig, ManifestRef};

use crate::output::print_report;

use super::CommandContext;

/// Run the scenario against the cluster.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Role a target node must carry.
    #[arg(long, env = "NODETUNE_ROLE")]
    role: Option<String>,

    /// Label key the profile matches on.
    #[arg(long, env = "NODETUNE_LABEL")]
    label: Option<String>,

    /// Profile manifest to create and delete.
    #[arg(long, env = "NODETUNE_MANIFEST")]
    manifest: Option<String>,

    /// Runtime parameter the profile sets.
    #[arg(long, env = "NODETUNE_PARAMETER")]
    parameter: Option<String>,

    /// Value the profile sets the parameter to.
    #[arg(long, env = "NODETUNE_VALUE")]
    value: Option<String>,

    /// Label selector for agent pods.
    #[arg(long, env = "NODETUNE_AGENT_SELECTOR")]
    agent_selector: Option<String>,

    /// Interval between parameter reads, in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Budget for the profile to take effect, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Budget for the original value to return, in seconds.
    ///
    /// Defaults to --timeout-secs.
    #[arg(long)]
    restore_timeout_secs: Option<u64>,
}

impl RunCommand {
    pub async fn run(self, mut ctx: CommandContext) -> Result<()> {
        self.apply(&mut ctx.config);

        let report = ctx.scenario().run().await;
        print_report(&report, ctx.format);

        report.into_result()?;
        Ok(())
    }

    /// Overlay flags on the environment-derived configuration.
    fn apply(self, config: &mut HarnessConfig) {
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(label) = self.label {
            config.label_key = label;
        }
        if let Some(manifest) = self.manifest {
            config.profile.manifest = ManifestRef::new(manifest);
        }
        if let Some(parameter) = self.parameter {
            config.profile.parameter = parameter;
        }
        if let Some(value) = self.value {
            config.profile.value = value;
        }
        if let Some(selector) = self.agent_selector {
            config.agent_selector = selector;
        }
        if let Some(ms) = self.interval_ms {
            config.poll.interval = Duration::from_millis(ms.max(50));
        }
        if let Some(secs) = self.timeout_secs {
            config.poll.convergence_budget = Duration::from_secs(secs);
            if self.restore_timeout_secs.is_none() {
                config.poll.restore_budget = config.poll.convergence_budget;
            }
        }
        if let Some(secs) = self.restore_timeout_secs {
            config.poll.restore_budget = Duration::from_secs(secs);
        }
    }
}
