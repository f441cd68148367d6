//! Target selection: which node to tune and which agent reports for it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::HarnessError;
use crate::gateway::ClusterGateway;
use crate::model::{Agent, Node};

/// Picks the target node from a role-filtered inventory.
#[derive(Clone)]
pub struct NodeSelector {
    gateway: Arc<dyn ClusterGateway>,
}

impl NodeSelector {
    /// Create a new node selector.
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    /// Select one node carrying `role`.
    ///
    /// The choice is deterministic: the node with the lowest name wins.
    pub async fn select(&self, role: &str) -> Result<Node, HarnessError> {
        let nodes = self
            .gateway
            .nodes_by_role(role)
            .await
            .map_err(|source| HarnessError::InventoryQueryFailed {
                what: "nodes",
                source,
            })?;

        debug!(role = %role, candidates = nodes.len(), "Listed nodes by role");

        let node = nodes
            .into_iter()
            .filter(|n| n.has_role(role))
            .min_by(|a, b| a.name.cmp(&b.name))
            .ok_or_else(|| HarnessError::NoEligibleTarget {
                role: role.to_string(),
            })?;

        info!(node = %node.name, role = %role, "Selected target node");
        Ok(node)
    }
}

/// Resolves the agent pod bound to a node.
#[derive(Clone)]
pub struct AgentLocator {
    gateway: Arc<dyn ClusterGateway>,
    namespace: String,
    selector: String,
}

impl AgentLocator {
    /// Create a new agent locator.
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        namespace: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            namespace: namespace.into(),
            selector: selector.into(),
        }
    }

    /// Find the agent running on `node`. No retry.
    pub async fn locate(&self, node: &Node) -> Result<Agent, HarnessError> {
        let mut agents = self
            .gateway
            .agents_on_node(&self.namespace, &self.selector, &node.name)
            .await
            .map_err(|source| HarnessError::InventoryQueryFailed {
                what: "agent pods",
                source,
            })?;

        agents.retain(|a| a.node == node.name);

        match agents.len() {
            0 => Err(HarnessError::AgentNotFound {
                node: node.name.clone(),
            }),
            1 => {
                let agent = agents.remove(0);
                info!(node = %node.name, agent = %agent.name, "Located agent");
                Ok(agent)
            }
            count => Err(HarnessError::AmbiguousAgent {
                node: node.name.clone(),
                count,
            }),
        }
    }
}
