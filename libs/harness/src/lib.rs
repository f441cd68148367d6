//! nodetune harness library
//!
//! Validates a tuning controller's label-driven profile selection: label one
//! node, create a profile that targets the label, wait for a runtime
//! parameter on the node to converge to the profile's value, then undo
//! everything and wait for the original value to come back.
//!
//! ## Architecture
//!
//! ```text
//! Scenario
//! ├── NodeSelector             (role-filtered, deterministic target)
//! ├── AgentLocator             (agent pod on the target node)
//! ├── ConvergenceObserver      (baseline read, bounded polling)
//! ├── ProfileLifecycleManager  (label + profile, mutation log)
//! └── RollbackGuard            (inverse actions on every exit path)
//! ```
//!
//! The cluster is reached only through [`ClusterGateway`] and
//! [`ParameterReader`]; [`CommandGateway`] implements both with the
//! cluster CLI.

pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod model;
pub mod observer;
pub mod rollback;
pub mod scenario;
pub mod selector;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use command::{CommandGateway, DEFAULT_COMMAND_TIMEOUT};
pub use config::{HarnessConfig, PollSettings};
pub use error::{GatewayError, HarnessError};
pub use gateway::{ClusterGateway, ParameterReader};
pub use lifecycle::ProfileLifecycleManager;
pub use model::{Agent, LabelAction, ManifestRef, Mutation, MutationRecord, Node, ProfileSpec};
pub use observer::ConvergenceObserver;
pub use rollback::{RollbackGuard, RollbackReport, RollbackStep};
pub use scenario::{RunReport, Scenario};
pub use selector::{AgentLocator, NodeSelector};
