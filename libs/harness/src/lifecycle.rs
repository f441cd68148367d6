//! Label and profile lifecycle on the target node.
//!
//! The label must be applied before the profile is created: the controller
//! evaluates the profile's match predicate against the label state at the
//! moment the profile appears.

use std::sync::Arc;

use tracing::info;

use crate::error::HarnessError;
use crate::gateway::ClusterGateway;
use crate::model::{LabelAction, ManifestRef, Mutation, MutationRecord};

/// Applies and removes the node label and the profile resource.
///
/// Every successful call is appended to the shared [`MutationRecord`].
/// Operations are single-attempt; nothing here retries.
#[derive(Clone)]
pub struct ProfileLifecycleManager {
    gateway: Arc<dyn ClusterGateway>,
    namespace: String,
    record: MutationRecord,
}

impl ProfileLifecycleManager {
    /// Create a new lifecycle manager.
    pub fn new(gateway: Arc<dyn ClusterGateway>, namespace: impl Into<String>) -> Self {
        Self {
            gateway,
            namespace: namespace.into(),
            record: MutationRecord::new(),
        }
    }

    /// Handle to the mutation log.
    pub fn record(&self) -> MutationRecord {
        self.record.clone()
    }

    /// Set `key` with an empty value on `node` (overwrite semantics).
    pub async fn apply_label(&self, node: &str, key: &str) -> Result<(), HarnessError> {
        info!(node = %node, label = %key, "Labelling node");
        self.gateway
            .set_node_label(node, key, "")
            .await
            .map_err(|source| HarnessError::LabelOperationFailed {
                node: node.to_string(),
                key: key.to_string(),
                action: LabelAction::Set,
                source,
            })?;

        self.record.push(Mutation::LabelSet {
            node: node.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    /// Clear `key` from `node`.
    ///
    /// An absent label surfaces as a not-found error (see
    /// [`HarnessError::is_not_found`]) which callers may ignore.
    pub async fn remove_label(&self, node: &str, key: &str) -> Result<(), HarnessError> {
        info!(node = %node, label = %key, "Removing label from node");
        self.gateway
            .remove_node_label(node, key)
            .await
            .map_err(|source| HarnessError::LabelOperationFailed {
                node: node.to_string(),
                key: key.to_string(),
                action: LabelAction::Remove,
                source,
            })?;

        self.record.push(Mutation::LabelCleared {
            node: node.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    /// Create the profile resource from `manifest`.
    pub async fn create_profile(&self, manifest: &ManifestRef) -> Result<(), HarnessError> {
        info!(manifest = %manifest, namespace = %self.namespace, "Creating profile");
        self.gateway
            .create_resource(&self.namespace, manifest)
            .await
            .map_err(|source| HarnessError::ProfileCreateFailed {
                manifest: manifest.clone(),
                source,
            })?;

        self.record.push(Mutation::ProfileCreated {
            manifest: manifest.clone(),
        });
        Ok(())
    }

    /// Delete the profile resource created from `manifest`.
    pub async fn delete_profile(&self, manifest: &ManifestRef) -> Result<(), HarnessError> {
        info!(manifest = %manifest, namespace = %self.namespace, "Deleting profile");
        self.gateway
            .delete_resource(&self.namespace, manifest)
            .await
            .map_err(|source| HarnessError::ProfileDeleteFailed {
                manifest: manifest.clone(),
                source,
            })?;

        self.record.push(Mutation::ProfileDeleted {
            manifest: manifest.clone(),
        });
        Ok(())
    }
}
