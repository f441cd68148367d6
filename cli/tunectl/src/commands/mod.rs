//! CLI commands.

mod cleanup;
mod run;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nodetune_harness::{HarnessConfig, Scenario};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::output::OutputFormat;

/// tunectl - Validate label-driven tuning profile selection on a cluster.
#[derive(Debug, Parser)]
#[command(name = "tunectl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json).
    #[arg(long, global = true, default_value = "text")]
    format: String,

    /// Cluster CLI binary (oc or kubectl).
    #[arg(long, global = true, env = "NODETUNE_CLUSTER_CLI")]
    cluster_cli: Option<String>,

    /// Cluster context to use (passed as --context).
    #[arg(long, global = true, env = "NODETUNE_CONTEXT")]
    context: Option<String>,

    /// Deadline for each cluster CLI call, in seconds.
    #[arg(long, global = true)]
    command_timeout_secs: Option<u64>,

    /// Namespace of the tuning operator.
    #[arg(long, global = true, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true, env = "NODETUNE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full label -> profile -> converge -> rollback scenario.
    Run(run::RunCommand),

    /// Remove the profile and the node label left behind by an interrupted run.
    Cleanup(cleanup::CleanupCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Initialize logging. Logs go to stderr so stdout stays parseable.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
        let registry = tracing_subscriber::registry().with(filter);

        if self.log_json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        };

        let mut config = HarnessConfig::from_env()?;
        if let Some(cli) = self.cluster_cli {
            config.cluster_cli = cli;
        }
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if let Some(context) = self.context {
            config.context = Some(context);
        }
        if let Some(secs) = self.command_timeout_secs {
            config.command_timeout = Duration::from_secs(secs.max(1));
        }

        info!(
            cluster_cli = %config.cluster_cli,
            namespace = %config.namespace,
            context = ?config.context,
            role = %config.role,
            manifest = %config.profile.manifest,
            "Configuration loaded"
        );

        let ctx = CommandContext { config, format };

        match self.command {
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Cleanup(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("tunectl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: HarnessConfig,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Build a scenario backed by the cluster CLI.
    pub fn scenario(&self) -> Scenario {
        let gateway = Arc::new(self.config.command_gateway());
        Scenario::new(&self.config, gateway.clone(), gateway)
    }
}
