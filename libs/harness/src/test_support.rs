//! Scripted gateway for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::gateway::{ClusterGateway, ParameterReader};
use crate::model::{Agent, ManifestRef, Node};

#[derive(Default)]
pub struct StubGateway {
    nodes: Vec<Node>,
    agents: Vec<Agent>,
    reads: Mutex<VecDeque<Result<String, GatewayError>>>,
    steady: String,
    failing: Vec<&'static str>,
    absent: Vec<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl StubGateway {
    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = agents;
        self
    }

    /// Reads are served from `reads` in order, then `steady` forever.
    pub fn with_reads(mut self, reads: Vec<Result<String, GatewayError>>, steady: &str) -> Self {
        self.reads = Mutex::new(reads.into());
        self.steady = steady.to_string();
        self
    }

    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.push(op);
        self
    }

    pub fn absent(mut self, op: &'static str) -> Self {
        self.absent.push(op);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, op: &'static str, detail: String) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(format!("{op} {detail}"));
        if self.failing.contains(&op) {
            return Err(GatewayError::CommandFailed {
                command: op.to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        if self.absent.contains(&op) {
            return Err(GatewayError::NotFound(detail));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterGateway for StubGateway {
    async fn nodes_by_role(&self, role: &str) -> Result<Vec<Node>, GatewayError> {
        self.call("nodes", role.to_string())?;
        Ok(self.nodes.clone())
    }

    async fn set_node_label(
        &self,
        node: &str,
        key: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        self.call("set_label", format!("{node} {key}={value}"))
    }

    async fn remove_node_label(&self, node: &str, key: &str) -> Result<(), GatewayError> {
        self.call("remove_label", format!("{node} {key}"))
    }

    async fn create_resource(
        &self,
        namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError> {
        self.call("create", format!("{namespace} {manifest}"))
    }

    async fn delete_resource(
        &self,
        namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError> {
        self.call("delete", format!("{namespace} {manifest}"))
    }

    async fn agents_on_node(
        &self,
        _namespace: &str,
        _selector: &str,
        node: &str,
    ) -> Result<Vec<Agent>, GatewayError> {
        self.call("agents", node.to_string())?;
        Ok(self
            .agents
            .iter()
            .filter(|a| a.node == node)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ParameterReader for StubGateway {
    async fn read_parameter(&self, agent: &Agent, name: &str) -> Result<String, GatewayError> {
        self.call("read", format!("{} {name}", agent.name))?;
        let next = self.reads.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.steady.clone()))
    }
}
