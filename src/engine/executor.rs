//! Deposit execution.
//!
//! `DepositExecutor` submits one deposit. `ExecutionOrchestrator` fans an
//! allocation out into one task per non-zero slice, runs them concurrently
//! with a per-task timeout, and reports every outcome on the progress
//! channel. A failing task never cancels its siblings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::engine::progress::ProgressChannel;
use crate::protocols::registry;
use crate::strategy::precision::{to_base_units, to_whole_units};
use crate::types::{
    Allocation, AllocationResult, AllocationSummary, AllocatorError, DepositReceipt, DepositTask,
    ExecutionOutcome, OutcomeStatus, RoutingParams,
};
use crate::wire::TerminalResult;

// ---------------------------------------------------------------------------
// Executor trait
// ---------------------------------------------------------------------------

/// Submits a single on-chain deposit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepositExecutor: Send + Sync {
    async fn deposit(&self, task: &DepositTask) -> Result<DepositReceipt>;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Logs the deposit and returns a synthetic receipt.
#[derive(Debug, Default, Clone)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DepositExecutor for DryRunExecutor {
    async fn deposit(&self, task: &DepositTask) -> Result<DepositReceipt> {
        info!(
            protocol = task.protocol.as_str(),
            vault = %task.vault_id,
            amount = %task.amount,
            base_units = task.base_units,
            action = task.protocol.entry().deposit_action,
            "[DRY RUN] Would submit deposit"
        );
        Ok(DepositReceipt {
            protocol: task.protocol,
            tx_hash: format!("dry-run-{}", uuid::Uuid::new_v4()),
            amount: task.amount.clone(),
            submitted_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

// ---------------------------------------------------------------------------
// Signing relay
// ---------------------------------------------------------------------------

/// Relay reply. Some relays answer `hash` instead of `txHash`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    hash: Option<String>,
}

/// Forwards typed deposit actions to a signing relay over HTTP.
///
/// The relay holds the key material; this side only knows the action name
/// and its arguments.
pub struct RelayExecutor {
    http: Client,
    relay_url: String,
    api_key: SecretString,
    token_to_approve: String,
}

impl RelayExecutor {
    pub fn new(relay_url: &str, api_key: SecretString, token_to_approve: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("yield-allocator/0.1.0")
            .build()
            .context("Failed to build relay HTTP client")?;

        Ok(Self {
            http,
            relay_url: relay_url.trim_end_matches('/').to_string(),
            api_key,
            token_to_approve: token_to_approve.to_string(),
        })
    }

    /// JSON body for the relay's action endpoint.
    pub fn request_body(task: &DepositTask, token_to_approve: &str) -> serde_json::Value {
        let args = match &task.routing {
            RoutingParams::Moonwell { destination } => json!({
                "destinationAddress": destination,
                "amount": task.amount,
                "tokenToApprove": token_to_approve,
            }),
            RoutingParams::Morpho { vault, receiver } => json!({
                "vaultAddress": vault,
                "amount": task.amount,
                "receiverAddress": receiver,
                "tokenToApprove": token_to_approve,
            }),
        };
        json!({
            "action": task.protocol.entry().deposit_action,
            "args": args,
        })
    }
}

#[async_trait]
impl DepositExecutor for RelayExecutor {
    async fn deposit(&self, task: &DepositTask) -> Result<DepositReceipt> {
        let url = format!("{}/actions", self.relay_url);
        let body = Self::request_body(task, &self.token_to_approve);
        debug!(url = %url, action = %body["action"], "Submitting deposit to relay");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Relay request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Relay error {status}: {body}");
        }

        let parsed: RelayResponse = resp
            .json()
            .await
            .context("Failed to parse relay response")?;
        let tx_hash = parsed
            .tx_hash
            .or(parsed.hash)
            .context("Relay response missing transaction hash")?;

        info!(
            protocol = task.protocol.as_str(),
            amount = %task.amount,
            tx_hash = %tx_hash,
            "Deposit submitted"
        );

        Ok(DepositReceipt {
            protocol: task.protocol,
            tx_hash,
            amount: task.amount.clone(),
            submitted_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Everything that happened to one allocation request's deposits.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// One per attempted deposit, in allocation order.
    pub outcomes: Vec<ExecutionOutcome>,
    /// One per allocation, attempted or not.
    pub summaries: Vec<AllocationSummary>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}

/// Fans deposits out to a `DepositExecutor`.
pub struct ExecutionOrchestrator {
    executor: Arc<dyn DepositExecutor>,
    task_timeout: Duration,
    asset: String,
}

impl ExecutionOrchestrator {
    pub fn new(executor: Arc<dyn DepositExecutor>, task_timeout: Duration, asset: &str) -> Self {
        Self {
            executor,
            task_timeout,
            asset: asset.to_string(),
        }
    }

    /// Build the deposit for one allocation. `Ok(None)` when there is
    /// nothing to deposit.
    pub fn build_task(
        allocation: &Allocation,
        wallet: &str,
    ) -> Result<Option<DepositTask>, AllocatorError> {
        if allocation.amount.is_nan() || allocation.amount <= 0.0 {
            return Ok(None);
        }
        let base_units = to_base_units(allocation.amount)?;
        if base_units == 0 {
            return Ok(None);
        }
        Ok(Some(DepositTask {
            protocol: allocation.protocol,
            vault_id: allocation.vault_id.clone(),
            amount: to_whole_units(allocation.amount)?,
            base_units,
            routing: registry::route(allocation, wallet)?,
        }))
    }

    /// Run every deposit for `allocation`, then emit the results section
    /// and the terminal result.
    ///
    /// Only `StreamClosed` is returned as an error; deposit failures are
    /// recorded in the report.
    pub async fn execute(
        &self,
        allocation: &AllocationResult,
        wallet: &str,
        progress: &ProgressChannel,
    ) -> Result<ExecutionReport, AllocatorError> {
        info!(
            executor = self.executor.name(),
            allocations = allocation.allocations.len(),
            timeout_secs = self.task_timeout.as_secs_f64(),
            "Executing deposits"
        );

        let futures: Vec<_> = allocation
            .allocations
            .iter()
            .enumerate()
            .map(|(index, a)| async move {
                let outcome = self.run_one(a, wallet, progress).await?;
                Ok::<_, AllocatorError>((index, outcome))
            })
            .collect();

        let mut settled: Vec<(usize, ExecutionOutcome)> = Vec::new();
        let mut closed = false;
        for result in join_all(futures).await {
            match result {
                Ok((index, Some(outcome))) => settled.push((index, outcome)),
                Ok((_, None)) => {}
                Err(AllocatorError::StreamClosed) => closed = true,
                Err(other) => return Err(other),
            }
        }
        if closed {
            return Err(AllocatorError::StreamClosed);
        }

        let summaries = allocation
            .allocations
            .iter()
            .enumerate()
            .map(|(index, a)| AllocationSummary {
                protocol: a.protocol,
                vault: a.vault_id.clone(),
                amount: a.amount,
                formatted_amount: to_whole_units(a.amount).unwrap_or_else(|_| "0.00".to_string()),
                status: settled
                    .iter()
                    .find(|(i, _)| *i == index)
                    .map(|(_, o)| o.status),
            })
            .collect();

        let report = ExecutionReport {
            outcomes: settled.into_iter().map(|(_, o)| o).collect(),
            summaries,
        };

        progress.log(self.results_section(&report)).await?;
        progress
            .result(&TerminalResult::new(
                allocation.clone(),
                report.summaries.clone(),
            ))
            .await?;

        info!(
            attempted = report.outcomes.len(),
            succeeded = report.succeeded(),
            "Deposits settled"
        );

        Ok(report)
    }

    /// One allocation from task construction to settled outcome.
    async fn run_one(
        &self,
        allocation: &Allocation,
        wallet: &str,
        progress: &ProgressChannel,
    ) -> Result<Option<ExecutionOutcome>, AllocatorError> {
        let task = match Self::build_task(allocation, wallet) {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!(protocol = allocation.protocol.as_str(), "Zero allocation, no deposit");
                return Ok(None);
            }
            Err(err) => {
                warn!(protocol = allocation.protocol.as_str(), error = %err, "Deposit not attempted");
                progress.error(&err).await?;
                return Ok(Some(ExecutionOutcome::failed(
                    allocation.protocol,
                    OutcomeStatus::Failed,
                    &err,
                )));
            }
        };

        progress
            .log(format!(
                "Depositing {} {} into {} ({})...",
                task.amount, self.asset, task.protocol, task.vault_id
            ))
            .await?;

        let outcome = match tokio::time::timeout(self.task_timeout, self.executor.deposit(&task)).await
        {
            Ok(Ok(receipt)) => {
                progress
                    .log(format!(
                        "{} deposit confirmed: {} {} (tx {})",
                        task.protocol, task.amount, self.asset, receipt.tx_hash
                    ))
                    .await?;
                ExecutionOutcome::succeeded(&task, receipt)
            }
            Ok(Err(e)) => {
                let err = AllocatorError::DepositFailed {
                    protocol: task.protocol,
                    reason: format!("{e:#}"),
                };
                warn!(protocol = task.protocol.as_str(), error = %err, "Deposit failed");
                progress.error(&err).await?;
                ExecutionOutcome::failed(task.protocol, OutcomeStatus::Failed, &err)
            }
            Err(_) => {
                let err = AllocatorError::DepositTimedOut {
                    protocol: task.protocol,
                    timeout: self.task_timeout,
                };
                warn!(protocol = task.protocol.as_str(), error = %err, "Deposit timed out");
                progress.error(&err).await?;
                ExecutionOutcome::failed(task.protocol, OutcomeStatus::TimedOut, &err)
            }
        };

        Ok(Some(outcome))
    }

    fn results_section(&self, report: &ExecutionReport) -> String {
        let mut lines = vec!["Deposit Results:".to_string()];
        if report.outcomes.is_empty() {
            lines.push("No deposits submitted".to_string());
        }
        for o in &report.outcomes {
            match (&o.receipt, &o.error) {
                (Some(receipt), _) => lines.push(format!(
                    "✓ {}: {} {} (tx {})",
                    o.protocol, o.amount_deposited, self.asset, receipt.tx_hash
                )),
                (None, error) => lines.push(format!(
                    "✗ {}: {} ({})",
                    o.protocol,
                    error.as_deref().unwrap_or("unknown error"),
                    o.status
                )),
            }
        }
        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
