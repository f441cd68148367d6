//! Convergence observation of agent-reported parameters.

use std::sync::Arc;
use std::time::Duration;

use nodetune_reconcile::poll_until;
use tracing::{info, warn};

use crate::error::HarnessError;
use crate::gateway::ParameterReader;
use crate::model::Agent;

/// Reads a runtime parameter once or polls it until it matches.
#[derive(Clone)]
pub struct ConvergenceObserver {
    reader: Arc<dyn ParameterReader>,
    interval: Duration,
}

impl ConvergenceObserver {
    /// Create a new observer sampling every `interval`.
    pub fn new(reader: Arc<dyn ParameterReader>, interval: Duration) -> Self {
        Self { reader, interval }
    }

    /// Single-shot read, used for the baseline.
    pub async fn read(&self, agent: &Agent, parameter: &str) -> Result<String, HarnessError> {
        self.reader
            .read_parameter(agent, parameter)
            .await
            .map(|v| v.trim().to_string())
            .map_err(|source| HarnessError::ReadError {
                agent: agent.name.clone(),
                parameter: parameter.to_string(),
                source,
            })
    }

    /// Poll until `parameter` equals `expected` or `budget` runs out.
    ///
    /// Failed reads count as "not converged yet". Both the samples and
    /// `expected` are compared trimmed. On timeout the last sample (value,
    /// read error or stalled read) is carried in the error.
    pub async fn await_value(
        &self,
        agent: &Agent,
        parameter: &str,
        expected: &str,
        budget: Duration,
    ) -> Result<String, HarnessError> {
        let expected = expected.trim();
        info!(
            agent = %agent.name,
            parameter = %parameter,
            expected = %expected,
            budget_secs = budget.as_secs_f64(),
            "Waiting for parameter to converge"
        );

        let reader = &self.reader;
        let result = poll_until(
            move || {
                let read = reader.read_parameter(agent, parameter);
                async move { read.await.map(|v| v.trim().to_string()) }
            },
            |value: &String| value == expected,
            self.interval,
            budget,
        )
        .await;

        match result {
            Ok(converged) => {
                info!(
                    agent = %agent.name,
                    parameter = %parameter,
                    value = %converged.value,
                    attempts = converged.attempts,
                    elapsed_ms = converged.elapsed.as_millis() as u64,
                    "Parameter converged"
                );
                Ok(converged.value)
            }
            Err(timeout) => {
                warn!(
                    agent = %agent.name,
                    parameter = %parameter,
                    expected = %expected,
                    attempts = timeout.attempts,
                    "Parameter did not converge"
                );
                Err(HarnessError::ConvergenceTimeout {
                    agent: agent.name.clone(),
                    parameter: parameter.to_string(),
                    expected: expected.to_string(),
                    budget,
                    elapsed: timeout.elapsed,
                    last: timeout.last,
                })
            }
        }
    }
}
