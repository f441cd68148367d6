//! Error display for the CLI.

use colored::Colorize;
use nodetune_harness::{GatewayError, HarnessError};

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = err.downcast_ref::<HarnessError>().and_then(hint_for) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

/// Suggest a next step for the failures an operator can act on.
fn hint_for(err: &HarnessError) -> Option<String> {
    match err {
        HarnessError::NoEligibleTarget { role } => Some(format!(
            "No node carries node-role.kubernetes.io/{role}. Pass --role to pick another role."
        )),
        HarnessError::AgentNotFound { .. } => Some(
            "The tuning agent may not be scheduled yet. Check --agent-selector and WATCH_NAMESPACE."
                .to_string(),
        ),
        HarnessError::InventoryQueryFailed {
            source: GatewayError::Spawn { program, .. },
            ..
        } => Some(format!(
            "Could not run `{program}`. Install it or pass --cluster-cli."
        )),
        HarnessError::InventoryQueryFailed {
            source: GatewayError::Timeout { .. },
            ..
        }
        | HarnessError::ReadError {
            source: GatewayError::Timeout { .. },
            ..
        } => Some(
            "The cluster CLI did not answer in time. Check connectivity or raise --command-timeout-secs."
                .to_string(),
        ),
        HarnessError::ConvergenceTimeout { .. } => Some(
            "The controller did not converge in time. Raise --timeout-secs or check the operator logs."
                .to_string(),
        ),
        HarnessError::RollbackIncomplete { failures } => {
            let node = failures.iter().find_map(|f| match f {
                HarnessError::LabelOperationFailed { node, .. } => Some(node.as_str()),
                _ => None,
            });
            Some(match node {
                Some(node) => format!("Run `tunectl cleanup --node {node}` to retry the rollback."),
                None => "Run `tunectl cleanup --node <node>` to retry the rollback.".to_string(),
            })
        }
        _ => None,
    }
}
