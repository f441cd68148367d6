//! In-memory cluster for exercising the harness without a real cluster.
//!
//! [`FakeCluster`] implements both [`ClusterGateway`] and [`ParameterReader`]
//! and simulates a tuning controller: a created profile whose label key is
//! present on a node drives that node's parameter to the profile value;
//! otherwise the parameter sits at its baseline.
//!
//! Knobs:
//! - convergence lag (number of reads before a change becomes visible)
//! - persistent failures and panics per operation
//! - transient read failures
//! - a controller that ignores profiles, or one that never restores
//!
//! Every call is logged so tests can assert on ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use nodetune_harness::{Agent, ClusterGateway, GatewayError, ManifestRef, Node, ParameterReader};
use tracing::debug;

/// Manifest used by the stock hugepages setup.
pub const HUGEPAGES_MANIFEST: &str = "manifests/hugepages.yaml";

/// Label the stock hugepages profile matches on.
pub const HUGEPAGES_LABEL: &str = "tuned.openshift.io/hugepages";

/// Parameter the stock hugepages profile sets.
pub const HUGEPAGES_PARAMETER: &str = "vm.nr_hugepages";

/// Namespace the stock setup places agents in.
pub const OPERATOR_NAMESPACE: &str = "openshift-cluster-node-tuning-operator";

/// Gateway operations, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    NodesByRole,
    SetLabel,
    RemoveLabel,
    CreateResource,
    DeleteResource,
    AgentsOnNode,
    ReadParameter,
}

/// A logged gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NodesByRole { role: String },
    SetLabel { node: String, key: String, value: String },
    RemoveLabel { node: String, key: String },
    CreateResource { manifest: ManifestRef },
    DeleteResource { manifest: ManifestRef },
    AgentsOnNode { node: String },
    ReadParameter { agent: String, parameter: String },
}

impl Call {
    /// The operation this call belongs to.
    pub fn op(&self) -> Op {
        match self {
            Self::NodesByRole { .. } => Op::NodesByRole,
            Self::SetLabel { .. } => Op::SetLabel,
            Self::RemoveLabel { .. } => Op::RemoveLabel,
            Self::CreateResource { .. } => Op::CreateResource,
            Self::DeleteResource { .. } => Op::DeleteResource,
            Self::AgentsOnNode { .. } => Op::AgentsOnNode,
            Self::ReadParameter { .. } => Op::ReadParameter,
        }
    }

    /// Returns true for calls that change cluster state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.op(),
            Op::SetLabel | Op::RemoveLabel | Op::CreateResource | Op::DeleteResource
        )
    }
}

/// What a profile manifest does once created.
#[derive(Debug, Clone)]
struct ProfileRule {
    label_key: String,
    parameter: String,
    value: String,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    agents: Vec<Agent>,
    baseline: BTreeMap<String, String>,
    applied: BTreeMap<(String, String), String>,
    rules: BTreeMap<ManifestRef, ProfileRule>,
    resources: BTreeSet<ManifestRef>,
    lag: u32,
    lag_remaining: u32,
    ignore_profiles: bool,
    never_restore: bool,
    failing: BTreeSet<Op>,
    panicking: BTreeSet<Op>,
    transient_read_failures: u32,
    calls: Vec<Call>,
}

impl State {
    /// Value the controller wants on `node` for `parameter`.
    fn desired(&self, node: &str, parameter: &str) -> Option<String> {
        let labels = self.nodes.get(node).map(|n| &n.labels);
        let from_profile = self
            .resources
            .iter()
            .filter_map(|m| self.rules.get(m))
            .find(|rule| {
                rule.parameter == parameter
                    && labels.is_some_and(|l| l.contains_key(&rule.label_key))
            })
            .map(|rule| rule.value.clone());

        from_profile.or_else(|| self.baseline.get(parameter).cloned())
    }

    fn mutated(&mut self) {
        self.lag_remaining = self.lag;
    }
}

/// Simulated cluster with a label-driven tuning controller.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stock setup: two workers and a master, each with a tuning agent,
    /// `vm.nr_hugepages` at `0`, and a hugepages profile setting it to `16`.
    pub fn hugepages() -> Self {
        Self::new()
            .with_node(Node::new("master-0").with_role("master"))
            .with_node(Node::new("worker-b").with_role("worker"))
            .with_node(Node::new("worker-a").with_role("worker"))
            .with_agent("master-0", "tuned-m0")
            .with_agent("worker-a", "tuned-wa")
            .with_agent("worker-b", "tuned-wb")
            .with_parameter(HUGEPAGES_PARAMETER, "0")
            .with_profile(HUGEPAGES_MANIFEST, HUGEPAGES_LABEL, HUGEPAGES_PARAMETER, "16")
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut State {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.state_mut().nodes.insert(node.name.clone(), node);
        self
    }

    /// Add an agent pod on `node`.
    pub fn with_agent(mut self, node: &str, pod: &str) -> Self {
        self.state_mut().agents.push(Agent {
            name: pod.to_string(),
            namespace: OPERATOR_NAMESPACE.to_string(),
            node: node.to_string(),
        });
        self
    }

    /// Set the baseline value of a parameter on every node.
    pub fn with_parameter(mut self, parameter: &str, baseline: &str) -> Self {
        self.state_mut()
            .baseline
            .insert(parameter.to_string(), baseline.to_string());
        self
    }

    /// Register what creating `manifest` does.
    pub fn with_profile(mut self, manifest: &str, label_key: &str, parameter: &str, value: &str) -> Self {
        self.state_mut().rules.insert(
            ManifestRef::new(manifest),
            ProfileRule {
                label_key: label_key.to_string(),
                parameter: parameter.to_string(),
                value: value.to_string(),
            },
        );
        self
    }

    /// Number of reads a change stays invisible for after each mutation.
    pub fn with_lag(mut self, reads: u32) -> Self {
        self.state_mut().lag = reads;
        self
    }

    /// The controller never reacts to profiles.
    pub fn ignoring_profiles(mut self) -> Self {
        self.state_mut().ignore_profiles = true;
        self
    }

    /// The controller applies profiles but never restores the baseline.
    pub fn never_restoring(mut self) -> Self {
        self.state_mut().never_restore = true;
        self
    }

    /// Every call of `op` fails.
    pub fn failing(mut self, op: Op) -> Self {
        self.state_mut().failing.insert(op);
        self
    }

    /// Every call of `op` panics.
    pub fn panicking(mut self, op: Op) -> Self {
        self.state_mut().panicking.insert(op);
        self
    }

    /// The next `count` reads fail.
    pub fn with_transient_read_failures(mut self, count: u32) -> Self {
        self.state_mut().transient_read_failures = count;
        self
    }

    /// All calls so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Mutating calls so far.
    pub fn mutation_calls(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of calls of `op` so far.
    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Current labels of a node.
    pub fn labels(&self, node: &str) -> Option<BTreeMap<String, String>> {
        self.state().nodes.get(node).map(|n| n.labels.clone())
    }

    /// Currently existing profile resources.
    pub fn resources(&self) -> Vec<ManifestRef> {
        self.state().resources.iter().cloned().collect()
    }

    /// Value currently in effect on a node, without advancing the simulation.
    pub fn value(&self, node: &str, parameter: &str) -> Option<String> {
        let state = self.state();
        state
            .applied
            .get(&(node.to_string(), parameter.to_string()))
            .or_else(|| state.baseline.get(parameter))
            .cloned()
    }

    /// Log a call and apply injected failures.
    fn enter(&self, call: Call) -> Result<(), GatewayError> {
        let op = call.op();
        let (panics, fails) = {
            let mut state = self.state();
            debug!(?call, "[FAKE] Gateway call");
            state.calls.push(call);
            (state.panicking.contains(&op), state.failing.contains(&op))
        };

        if panics {
            panic!("[FAKE] injected panic during {op:?}");
        }
        if fails {
            return Err(GatewayError::CommandFailed {
                command: format!("{op:?}"),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn nodes_by_role(&self, role: &str) -> Result<Vec<Node>, GatewayError> {
        self.enter(Call::NodesByRole {
            role: role.to_string(),
        })?;
        Ok(self
            .state()
            .nodes
            .values()
            .filter(|n| n.has_role(role))
            .cloned()
            .collect())
    }

    async fn set_node_label(
        &self,
        node: &str,
        key: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        self.enter(Call::SetLabel {
            node: node.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })?;

        let mut state = self.state();
        let target = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| GatewayError::NotFound(format!("node {node}")))?;
        target.labels.insert(key.to_string(), value.to_string());
        state.mutated();
        Ok(())
    }

    async fn remove_node_label(&self, node: &str, key: &str) -> Result<(), GatewayError> {
        self.enter(Call::RemoveLabel {
            node: node.to_string(),
            key: key.to_string(),
        })?;

        let mut state = self.state();
        let target = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| GatewayError::NotFound(format!("node {node}")))?;
        if target.labels.remove(key).is_none() {
            return Err(GatewayError::NotFound(format!("label {key} on node {node}")));
        }
        state.mutated();
        Ok(())
    }

    async fn create_resource(
        &self,
        _namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError> {
        self.enter(Call::CreateResource {
            manifest: manifest.clone(),
        })?;

        let mut state = self.state();
        if !state.resources.insert(manifest.clone()) {
            return Err(GatewayError::CommandFailed {
                command: format!("create -f {manifest}"),
                stderr: "AlreadyExists".to_string(),
            });
        }
        state.mutated();
        Ok(())
    }

    async fn delete_resource(
        &self,
        _namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError> {
        self.enter(Call::DeleteResource {
            manifest: manifest.clone(),
        })?;

        let mut state = self.state();
        if !state.resources.remove(manifest) {
            return Err(GatewayError::NotFound(format!("resource from {manifest}")));
        }
        state.mutated();
        Ok(())
    }

    async fn agents_on_node(
        &self,
        _namespace: &str,
        _selector: &str,
        node: &str,
    ) -> Result<Vec<Agent>, GatewayError> {
        self.enter(Call::AgentsOnNode {
            node: node.to_string(),
        })?;
        Ok(self
            .state()
            .agents
            .iter()
            .filter(|a| a.node == node)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ParameterReader for FakeCluster {
    async fn read_parameter(&self, agent: &Agent, name: &str) -> Result<String, GatewayError> {
        self.enter(Call::ReadParameter {
            agent: agent.name.clone(),
            parameter: name.to_string(),
        })?;

        let mut state = self.state();
        if state.transient_read_failures > 0 {
            state.transient_read_failures -= 1;
            return Err(GatewayError::CommandFailed {
                command: format!("exec {} -- sysctl -n {name}", agent.name),
                stderr: "container not ready".to_string(),
            });
        }

        let key = (agent.node.clone(), name.to_string());
        let baseline = state
            .baseline
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("parameter {name}")))?;
        let current = state.applied.get(&key).cloned().unwrap_or(baseline.clone());

        let mut desired = if state.ignore_profiles {
            current.clone()
        } else {
            state.desired(&agent.node, name).unwrap_or(baseline.clone())
        };
        if state.never_restore && desired == baseline {
            desired = current.clone();
        }

        if current == desired {
            return Ok(current);
        }
        if state.lag_remaining > 0 {
            state.lag_remaining -= 1;
            return Ok(current);
        }

        state.applied.insert(key, desired.clone());
        Ok(desired)
    }
}
