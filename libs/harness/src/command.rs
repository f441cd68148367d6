//! Gateway backed by the cluster command-line client.
//!
//! Every operation shells out to `oc` (or `kubectl`) and logs the command
//! together with its output:
//! - `get nodes -l node-role.kubernetes.io/<role> -o json`
//! - `label node --overwrite <node> <key>=` / `<key>-`
//! - `create|delete -n <ns> -f <manifest>`
//! - `get pods -n <ns> -l <selector> --field-selector spec.nodeName=<node> -o json`
//! - `exec -n <ns> <pod> -- sysctl -n <parameter>`
//!
//! Each command runs under a deadline and is killed when it expires.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::gateway::{ClusterGateway, ParameterReader};
use crate::model::{Agent, ManifestRef, Node, ROLE_LABEL_PREFIX};

/// Default deadline for a single CLI invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Gateway that drives the cluster through its CLI binary.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    /// Binary to invoke (`oc`, `kubectl`, or a full path).
    program: String,

    /// Arguments placed before every subcommand (e.g. `--context`).
    leading_args: Vec<String>,

    /// Deadline per invocation.
    timeout: Duration,
}

impl CommandGateway {
    /// Create a gateway for the given CLI binary.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Pass `args` ahead of every subcommand.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-command deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the CLI binary.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run a command, log it, and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, GatewayError> {
        let mut argv: Vec<&str> = self.leading_args.iter().map(String::as_str).collect();
        argv.extend_from_slice(args);

        let command = format!("{} {}", self.program, argv.join(" "));
        info!(command = %command, "Executing command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&argv).kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| GatewayError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(
                    command = %command,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Command timed out, killed"
                );
                return Err(GatewayError::Timeout {
                    command,
                    after: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(
            command = %command,
            status = ?output.status.code(),
            stdout = %stdout.trim(),
            stderr = %stderr,
            "Command finished"
        );

        if !output.status.success() {
            return Err(classify_failure(command, stderr));
        }

        Ok(stdout)
    }
}

/// Map a failed command to a gateway error.
///
/// Only an absent object counts as not-found: the server's `(NotFound)`
/// reason or the client's `<kind> "<name>" not found`. A missing kind or API
/// (`resource mapping not found`, `no matches for kind`) is a real failure.
fn classify_failure(command: String, stderr: String) -> GatewayError {
    let missing_kind =
        stderr.contains("resource mapping not found") || stderr.contains("no matches for kind");
    let missing_object = stderr.contains("(NotFound)") || stderr.contains("\" not found");

    if missing_object && !missing_kind {
        GatewayError::NotFound(stderr)
    } else {
        GatewayError::CommandFailed { command, stderr }
    }
}

/// Returns true if `label <key>-` reported that the label was not there.
///
/// Recent clients exit 0 in that case and only say so on stdout.
fn label_was_absent(stdout: &str, key: &str) -> bool {
    stdout.contains(&format!("label \"{key}\" not found"))
}

#[async_trait]
impl ClusterGateway for CommandGateway {
    async fn nodes_by_role(&self, role: &str) -> Result<Vec<Node>, GatewayError> {
        let selector = format!("{ROLE_LABEL_PREFIX}{role}");
        let args = ["get", "nodes", "-l", &selector, "-o", "json"];
        let stdout = self.run(&args).await?;
        parse_nodes(&stdout).map_err(|message| GatewayError::Parse {
            command: args.join(" "),
            message,
        })
    }

    async fn set_node_label(
        &self,
        node: &str,
        key: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        let label = format!("{key}={value}");
        self.run(&["label", "node", "--overwrite", node, &label])
            .await
            .map(|_| ())
    }

    async fn remove_node_label(&self, node: &str, key: &str) -> Result<(), GatewayError> {
        let label = format!("{key}-");
        let stdout = self
            .run(&["label", "node", "--overwrite", node, &label])
            .await?;
        if label_was_absent(&stdout, key) {
            return Err(GatewayError::NotFound(format!("label {key} on node {node}")));
        }
        Ok(())
    }

    async fn create_resource(
        &self,
        namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError> {
        self.run(&["create", "-n", namespace, "-f", manifest.as_str()])
            .await
            .map(|_| ())
    }

    async fn delete_resource(
        &self,
        namespace: &str,
        manifest: &ManifestRef,
    ) -> Result<(), GatewayError> {
        self.run(&["delete", "-n", namespace, "-f", manifest.as_str()])
            .await
            .map(|_| ())
    }

    async fn agents_on_node(
        &self,
        namespace: &str,
        selector: &str,
        node: &str,
    ) -> Result<Vec<Agent>, GatewayError> {
        let field_selector = format!("spec.nodeName={node}");
        let args = [
            "get",
            "pods",
            "-n",
            namespace,
            "-l",
            selector,
            "--field-selector",
            &field_selector,
            "-o",
            "json",
        ];
        let stdout = self.run(&args).await?;
        parse_pods(&stdout).map_err(|message| GatewayError::Parse {
            command: args.join(" "),
            message,
        })
    }
}

#[async_trait]
impl ParameterReader for CommandGateway {
    async fn read_parameter(&self, agent: &Agent, name: &str) -> Result<String, GatewayError> {
        let stdout = self
            .run(&["exec", "-n", &agent.namespace, &agent.name, "--", "sysctl", "-n", name])
            .await?;
        Ok(stdout.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NodeObject {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    node_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodObject {
    metadata: ObjectMeta,
    spec: PodSpec,
}

/// Parse `get nodes -o json` output.
fn parse_nodes(json: &str) -> Result<Vec<Node>, String> {
    let list: ObjectList<NodeObject> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    Ok(list
        .items
        .into_iter()
        .map(|n| Node {
            name: n.metadata.name,
            labels: n.metadata.labels,
        })
        .collect())
}

/// Parse `get pods -o json` output. Pods not yet bound to a node are skipped.
fn parse_pods(json: &str) -> Result<Vec<Agent>, String> {
    let list: ObjectList<PodObject> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|p| {
            let node = p.spec.node_name?;
            Some(Agent {
                name: p.metadata.name,
                namespace: p.metadata.namespace.unwrap_or_default(),
                node,
            })
        })
        .collect())
}
