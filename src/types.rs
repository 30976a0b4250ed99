//! Shared types for the allocator.
//!
//! These types form the data model used across all modules. Everything here
//! is request-scoped: built for a single allocation request and dropped when
//! the response stream closes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// A supported lending protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Moonwell,
    Morpho,
}

impl Protocol {
    /// All modelled protocols, primary first.
    pub const ALL: [Protocol; 2] = [Protocol::Moonwell, Protocol::Morpho];

    /// Lower-case wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Moonwell => "moonwell",
            Protocol::Morpho => "morpho",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Moonwell => write!(f, "Moonwell"),
            Protocol::Morpho => write!(f, "Morpho"),
        }
    }
}

/// Parse a protocol identifier (case-insensitive).
impl std::str::FromStr for Protocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "moonwell" => Ok(Protocol::Moonwell),
            "morpho" => Ok(Protocol::Morpho),
            other => anyhow::bail!("Unsupported protocol: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pool data
// ---------------------------------------------------------------------------

/// A lending venue reduced to the fields the scorer cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolData {
    pub protocol: Protocol,
    /// Provider key of the market or vault (e.g. `MOONWELL_USDC`).
    pub vault_id: String,
    /// Market token / vault contract address deposits are routed to.
    pub address: String,
    /// Supply APY in percentage points.
    pub supply_apy: f64,
    /// Utilization in percent. Not clamped: vault-style reporting can exceed 100.
    pub utilization_rate: f64,
    /// Liquidity in quote-currency units.
    pub available_liquidity: f64,
    /// 0–10, higher is safer.
    pub risk_score: f64,
}

impl PoolData {
    /// APY rendered the way allocations carry it (`"4.21%"`).
    pub fn apy_label(&self) -> String {
        format!("{:.2}%", self.supply_apy)
    }

    /// Helper to build a test pool with the given scoring inputs.
    #[cfg(test)]
    pub fn sample(protocol: Protocol, apy: f64, util: f64, risk: f64, liquidity: f64) -> Self {
        PoolData {
            protocol,
            vault_id: format!("{}_USDC", protocol.as_str().to_uppercase()),
            address: match protocol {
                Protocol::Moonwell => "0xEdc817A28E8B93B03976FBd4a3dDBc9f7D176c22".to_string(),
                Protocol::Morpho => "0xc1256Ae5FF1cf2719D4937adb3bbCCab2E00A2Ca".to_string(),
            },
            supply_apy: apy,
            utilization_rate: util,
            available_liquidity: liquidity,
            risk_score: risk,
        }
    }
}

impl fmt::Display for PoolData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} | APY: {:.2}% | Util: {:.1}% | Risk: {:.1}/10 | Liquidity: ${:.2}M",
            self.protocol.to_string(),
            self.supply_apy,
            self.utilization_rate,
            self.risk_score,
            self.available_liquidity / 1e6,
        )
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// One slice of the requested amount, bound to a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub protocol: Protocol,
    #[serde(rename = "vault")]
    pub vault_id: String,
    pub address: String,
    /// Same unit as the requested total (whole USDC).
    pub amount: f64,
    #[serde(rename = "apy")]
    pub apy_label: String,
}

impl Allocation {
    pub fn from_pool(pool: &PoolData, amount: f64) -> Self {
        Allocation {
            protocol: pool.protocol,
            vault_id: pool.vault_id.clone(),
            address: pool.address.clone(),
            amount,
            apy_label: pool.apy_label(),
        }
    }
}

/// The full split produced by the allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub total: f64,
    pub allocations: Vec<Allocation>,
}

impl AllocationResult {
    /// Sum of all allocation amounts.
    pub fn allocated(&self) -> f64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

impl fmt::Display for AllocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .allocations
            .iter()
            .map(|a| format!("{}: {:.6}", a.protocol.as_str(), a.amount))
            .collect();
        write!(f, "total {:.6} -> {}", self.total, parts.join(" | "))
    }
}

// ---------------------------------------------------------------------------
// Deposit execution
// ---------------------------------------------------------------------------

/// Protocol-specific routing for a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum RoutingParams {
    /// Mint market tokens; `destination` is the mToken contract.
    Moonwell { destination: String },
    /// ERC-4626 deposit into `vault`, shares minted to `receiver`.
    Morpho { vault: String, receiver: String },
}

impl RoutingParams {
    pub fn protocol(&self) -> Protocol {
        match self {
            RoutingParams::Moonwell { .. } => Protocol::Moonwell,
            RoutingParams::Morpho { .. } => Protocol::Morpho,
        }
    }
}

/// A single deposit to submit, derived from a non-zero allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositTask {
    pub protocol: Protocol,
    pub vault_id: String,
    /// Fixed 2-decimal whole-unit amount (e.g. `"569.90"`).
    pub amount: String,
    /// The same amount in 6-decimal base units.
    pub base_units: u64,
    pub routing: RoutingParams,
}

/// Confirmation returned by a deposit executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub protocol: Protocol,
    pub tx_hash: String,
    pub amount: String,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for DepositReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} tx={}", self.protocol.as_str(), self.amount, self.tx_hash)
    }
}

/// Settled state of one deposit task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    #[serde(rename = "timeout")]
    TimedOut,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Succeeded => write!(f, "succeeded"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::TimedOut => write!(f, "timeout"),
        }
    }
}

/// Result of one deposit attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub protocol: Protocol,
    pub status: OutcomeStatus,
    pub amount_deposited: String,
    pub receipt: Option<DepositReceipt>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(task: &DepositTask, receipt: DepositReceipt) -> Self {
        Self {
            protocol: task.protocol,
            status: OutcomeStatus::Succeeded,
            amount_deposited: task.amount.clone(),
            receipt: Some(receipt),
            error: None,
        }
    }

    pub fn failed(protocol: Protocol, status: OutcomeStatus, error: &AllocatorError) -> Self {
        Self {
            protocol,
            status,
            amount_deposited: "0.00".to_string(),
            receipt: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Terminal-result entry for one originally computed allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    pub protocol: Protocol,
    pub vault: String,
    /// Raw allocator amount, unrounded.
    pub amount: f64,
    pub formatted_amount: String,
    /// `None` when the allocation was zero and no deposit was attempted.
    pub status: Option<OutcomeStatus>,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Balances for the configured account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub address: String,
    /// USDC in 6-decimal base units.
    pub usdc_balance: u64,
    /// Native ETH, 18-decimal scaled to a float.
    pub eth_balance: f64,
}

/// `0x` followed by 40 hex digits.
pub fn is_evm_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors for an allocation request.
///
/// Every variant reaches the caller as an `Error: …` progress line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocatorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Market unavailable ({protocol}): {reason}")]
    MarketUnavailable { protocol: Protocol, reason: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{protocol} deposit failed: {reason}")]
    DepositFailed { protocol: Protocol, reason: String },

    #[error("{protocol} deposit timed out after {timeout:?}")]
    DepositTimedOut { protocol: Protocol, timeout: Duration },

    #[error("Progress stream closed by caller")]
    StreamClosed,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
