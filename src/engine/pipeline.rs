//! Allocation request pipeline.
//!
//! validate amount → balance check → fetch markets → normalize → allocate
//! → execute deposits. Every stage narrates on the request's progress
//! channel; any stage error ends the stream with an `Error:` line.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};

use crate::engine::executor::{ExecutionOrchestrator, ExecutionReport};
use crate::engine::progress::ProgressChannel;
use crate::protocols::{MarketDataProvider, MarketRecord};
use crate::strategy::allocator::Allocator;
use crate::strategy::normalizer::normalize;
use crate::strategy::precision::{format_base_units, to_base_units};
use crate::types::{AllocatorError, Protocol};
use crate::wallet::{Token, WalletProvider};

/// Extract and validate `amount` from a `{ "amount": number }` body.
///
/// Numeric strings are accepted. Zero, negative and non-finite amounts are
/// rejected.
pub fn parse_amount(body: &[u8]) -> Result<f64, AllocatorError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AllocatorError::InvalidInput(format!("request body is not valid JSON: {e}")))?;

    let amount = match value.get("amount") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AllocatorError::InvalidInput("amount must be a number".into()))?;

    if !amount.is_finite() || amount <= 0.0 {
        return Err(AllocatorError::InvalidInput(format!(
            "amount must be a positive number, got {amount}"
        )));
    }
    Ok(amount)
}

/// Runs one allocation request end to end.
pub struct AllocationPipeline {
    markets: Arc<dyn MarketDataProvider>,
    wallet: Arc<dyn WalletProvider>,
    allocator: Allocator,
    orchestrator: ExecutionOrchestrator,
    wallet_address: String,
    asset: String,
}

impl AllocationPipeline {
    pub fn new(
        markets: Arc<dyn MarketDataProvider>,
        wallet: Arc<dyn WalletProvider>,
        orchestrator: ExecutionOrchestrator,
        wallet_address: &str,
        asset: &str,
    ) -> Self {
        Self {
            markets,
            wallet,
            allocator: Allocator::new(asset),
            orchestrator,
            wallet_address: wallet_address.to_string(),
            asset: asset.to_string(),
        }
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    /// Run the request, reporting failure on the stream instead of returning
    /// it. The stream closes when `progress` is dropped at the end.
    pub async fn run(&self, body: &[u8], progress: ProgressChannel) {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("allocation", %request_id);

        async {
            match self.try_run(body, &progress).await {
                Ok(report) => info!(
                    attempted = report.outcomes.len(),
                    succeeded = report.succeeded(),
                    "Allocation request complete"
                ),
                Err(AllocatorError::StreamClosed) => {
                    warn!("Caller disconnected, request abandoned")
                }
                Err(err) => {
                    error!(error = %err, "Allocation request failed");
                    if progress.error(&err).await.is_err() {
                        warn!("Caller disconnected before the error could be reported");
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Every stage, propagating the first error.
    pub async fn try_run(
        &self,
        body: &[u8],
        progress: &ProgressChannel,
    ) -> Result<ExecutionReport, AllocatorError> {
        let amount = parse_amount(body)?;
        info!(amount, asset = %self.asset, "Allocation requested");

        self.check_balance(amount).await?;

        progress.log("Fetching market data...").await?;
        let (moonwell, morpho) = tokio::join!(
            self.fetch(Protocol::Moonwell),
            self.fetch(Protocol::Morpho),
        );
        let (moonwell, morpho) = (moonwell?, morpho?);

        progress
            .log(format!(
                "Found markets:\n- {}: {}\n- {}: {}",
                moonwell.protocol(),
                moonwell.key(),
                morpho.protocol(),
                morpho.key()
            ))
            .await?;

        let snapshot = normalize(&moonwell, std::slice::from_ref(&morpho), &self.asset)?;
        let allocation = self.allocator.allocate(amount, &snapshot, progress).await?;
        info!(allocation = %allocation, "Allocation ready for execution");

        self.orchestrator
            .execute(&allocation, &self.wallet_address, progress)
            .await
    }

    /// Reject amounts the wallet cannot cover.
    async fn check_balance(&self, amount: f64) -> Result<(), AllocatorError> {
        let required = to_base_units(amount).map_err(|e| match e {
            AllocatorError::InvalidAmount(reason) => AllocatorError::InvalidInput(reason),
            other => other,
        })?;
        let balance = self
            .wallet
            .get_balance(&self.wallet_address, Token::Usdc)
            .await
            .map_err(|e| AllocatorError::WalletUnavailable(format!("{e:#}")))?;

        if u128::from(required) > balance {
            let available = format_base_units(u64::try_from(balance).unwrap_or(u64::MAX));
            return Err(AllocatorError::InvalidInput(format!(
                "amount {amount} exceeds available balance of {available} {}",
                self.asset
            )));
        }
        Ok(())
    }

    async fn fetch(&self, protocol: Protocol) -> Result<MarketRecord, AllocatorError> {
        self.markets
            .fetch(protocol, &self.asset)
            .await
            .map_err(|e| AllocatorError::MarketUnavailable {
                protocol,
                reason: format!("{e:#}"),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
