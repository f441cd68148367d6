//! Cluster objects as the harness sees them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Label prefix that marks a node role (`node-role.kubernetes.io/worker`).
pub const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// A cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node name.
    pub name: String,

    /// All labels currently on the node, role labels included.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Node {
    /// Create a node without labels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a role label.
    pub fn with_role(self, role: &str) -> Self {
        self.with_label(format!("{ROLE_LABEL_PREFIX}{role}"), "")
    }

    /// Add an arbitrary label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Role names derived from the role labels.
    pub fn roles(&self) -> BTreeSet<&str> {
        self.labels
            .keys()
            .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
            .filter(|role| !role.is_empty())
            .collect()
    }

    /// Check whether the node carries a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().contains(role)
    }

    /// Check whether the node carries a label key (any value).
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }
}

/// The per-node tuning agent (a pod).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Pod name.
    pub name: String,

    /// Pod namespace.
    pub namespace: String,

    /// Node the pod is bound to.
    pub node: String,
}

/// Reference to a preexisting declarative resource (usually a file path).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestRef(String);

impl ManifestRef {
    /// Create a manifest reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ManifestRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A tuning profile under test: where it lives and what it should set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSpec {
    /// Manifest the profile is created from.
    pub manifest: ManifestRef,

    /// Runtime parameter the profile sets.
    pub parameter: String,

    /// Value the profile declares for the parameter.
    pub value: String,
}

/// Direction of a label change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAction {
    Set,
    Remove,
}

impl fmt::Display for LabelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => f.write_str("set"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// A cluster mutation that went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    LabelSet { node: String, key: String },
    LabelCleared { node: String, key: String },
    ProfileCreated { manifest: ManifestRef },
    ProfileDeleted { manifest: ManifestRef },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelSet { node, key } => write!(f, "label {key} set on {node}"),
            Self::LabelCleared { node, key } => write!(f, "label {key} cleared on {node}"),
            Self::ProfileCreated { manifest } => write!(f, "profile created from {manifest}"),
            Self::ProfileDeleted { manifest } => write!(f, "profile deleted from {manifest}"),
        }
    }
}

/// Ordered log of mutations performed during a run.
///
/// Cloning yields a handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct MutationRecord {
    entries: Arc<Mutex<Vec<Mutation>>>,
}

impl MutationRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation.
    pub fn push(&self, mutation: Mutation) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mutation);
    }

    /// Copy of all mutations in the order they happened.
    pub fn snapshot(&self) -> Vec<Mutation> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded mutations.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
