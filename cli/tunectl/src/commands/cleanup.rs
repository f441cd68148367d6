//! Standalone rollback for a node left labeled by an interrupted run.

use anyhow::Result;
use clap::Args;
use nodetune_harness::{HarnessError, ManifestRef};

use crate::output::print_rollback;

use super::CommandContext;

/// Delete the profile and remove the label from a node.
#[derive(Debug, Args)]
pub struct CleanupCommand {
    /// Node to remove the label from.
    #[arg(long)]
    node: String,

    /// Label key to remove.
    #[arg(long, env = "NODETUNE_LABEL")]
    label: Option<String>,

    /// Profile manifest to delete.
    #[arg(long, env = "NODETUNE_MANIFEST")]
    manifest: Option<String>,
}

impl CleanupCommand {
    pub async fn run(self, mut ctx: CommandContext) -> Result<()> {
        if let Some(label) = self.label {
            ctx.config.label_key = label;
        }
        if let Some(manifest) = self.manifest {
            ctx.config.profile.manifest = ManifestRef::new(manifest);
        }

        let report = ctx.scenario().cleanup(&self.node).await;
        print_rollback(&report, ctx.format);

        if !report.is_clean() {
            return Err(HarnessError::RollbackIncomplete {
                failures: report.failures,
            }
            .into());
        }
        Ok(())
    }
}
