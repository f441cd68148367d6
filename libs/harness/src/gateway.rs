//! Interfaces to the cluster and to the tuning agents.
//!
//! The harness never talks to a cluster directly. Everything goes through
//! these traits:
//! - [`ClusterGateway`]: node inventory, labels, declarative resources, pods
//! - [`ParameterReader`]: runtime parameter values as reported by an agent
//!
//! [`crate::command::CommandGateway`] implements both on top of `oc`/`kubectl`.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{Agent, ManifestRef, Node};

/// Cluster-management operations consumed by the harness.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// List nodes that carry the given role.
    async fn nodes_by_role(&self, role: &str) -> Result<Vec<Node>, GatewayError>;

    /// Set a label on a node, overwriting any existing value.
    async fn set_node_label(&self, node: &str, key: &str, value: &str)
        -> Result<(), GatewayError>;

    /// Clear a label from a node.
    async fn remove_node_label(&self, node: &str, key: &str) -> Result<(), GatewayError>;

    /// Create the resource described by a manifest.
    async fn create_resource(
        &self,
        namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError>;

    /// Delete the resource described by a manifest.
    async fn delete_resource(
        &self,
        namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError>;

    /// List agent pods (matching `selector`) scheduled on a node.
    async fn agents_on_node(
        &self,
        namespace: &str,
        selector: &str,
        node: &str,
    ) -> Result<Vec<Agent>, GatewayError>;
}

/// Reads runtime parameters through an agent.
#[async_trait]
pub trait ParameterReader: Send + Sync {
    /// Read the current value of a named parameter.
    async fn read_parameter(&self, agent: &Agent, name: &str) -> Result<String, GatewayError>;
}
