//! Mock collaborators for integration testing.
//!
//! In-memory implementations of `MarketDataProvider`, `WalletProvider` and
//! `DepositExecutor`. Records, balances and failures are controllable from
//! test code; nothing touches the network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use yield_allocator::engine::executor::DepositExecutor;
use yield_allocator::protocols::moonwell::MoonwellMarket;
use yield_allocator::protocols::morpho::MorphoVault;
use yield_allocator::protocols::{Amount, MarketDataProvider, MarketRecord, TokenConfig};
use yield_allocator::types::{DepositReceipt, DepositTask, Protocol};
use yield_allocator::wallet::{Token, WalletProvider};

pub const WALLET: &str = "0x1111111111111111111111111111111111111111";
pub const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn usdc_token() -> TokenConfig {
    TokenConfig {
        address: USDC.to_string(),
        decimals: 6,
        name: "USD Coin".to_string(),
        symbol: "USDC".to_string(),
    }
}

/// Moonwell USDC market normalizing to APY 10, utilization 50, risk 8.
pub fn moonwell_market() -> MoonwellMarket {
    MoonwellMarket {
        market_key: "MOONWELL_USDC".to_string(),
        chain_id: 8453,
        market_token: TokenConfig {
            address: "0xEdc817A28E8B93B03976FBd4a3dDBc9f7D176c22".to_string(),
            decimals: 8,
            name: "Moonwell USDC".to_string(),
            symbol: "mUSDC".to_string(),
        },
        underlying_token: usdc_token(),
        collateral_factor: Some(1.0),
        underlying_price: 1.0,
        total_supply_usd: 20_000_000.0,
        total_borrows_usd: 10_000_000.0,
        base_supply_apy: 10.0,
        ..MoonwellMarket::default()
    }
}

/// Morpho vault normalizing to APY 5, utilization 20, risk 10.
pub fn morpho_vault(underlying: &str) -> MorphoVault {
    MorphoVault {
        vault_key: "mwUSDC".to_string(),
        chain_id: 8453,
        vault_token: TokenConfig {
            address: "0xc1256Ae5FF1cf2719D4937adb3bbCCab2E00A2Ca".to_string(),
            decimals: 18,
            name: "Moonwell Flagship USDC".to_string(),
            symbol: "mwUSDC".to_string(),
        },
        underlying_token: TokenConfig {
            symbol: underlying.to_string(),
            ..usdc_token()
        },
        total_supply: Amount::from_value(2_000_000.0, 6),
        total_supply_usd: 2_000_000.0,
        total_liquidity: Amount::from_value(10_000_000.0, 6),
        total_liquidity_usd: 10_000_000.0,
        total_apy: 5.0,
        ..MorphoVault::default()
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

pub struct MockMarkets {
    records: HashMap<Protocol, MarketRecord>,
    calls: Arc<Mutex<Vec<Protocol>>>,
    /// If set, every fetch for that protocol fails with this message.
    errors: Arc<Mutex<HashMap<Protocol, String>>>,
}

impl MockMarkets {
    pub fn new(morpho_underlying: &str) -> Self {
        let mut records = HashMap::new();
        records.insert(Protocol::Moonwell, MarketRecord::Moonwell(moonwell_market()));
        records.insert(
            Protocol::Morpho,
            MarketRecord::Morpho(morpho_vault(morpho_underlying)),
        );
        Self {
            records,
            calls: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set_error(&self, protocol: Protocol, msg: &str) {
        self.errors.lock().unwrap().insert(protocol, msg.to_string());
    }

    pub fn calls(&self) -> Vec<Protocol> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarkets {
    async fn fetch(&self, protocol: Protocol, _asset: &str) -> Result<MarketRecord> {
        self.calls.lock().unwrap().push(protocol);
        if let Some(msg) = self.errors.lock().unwrap().get(&protocol) {
            return Err(anyhow!(msg.clone()));
        }
        self.records
            .get(&protocol)
            .cloned()
            .ok_or_else(|| anyhow!("no record for {protocol}"))
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

pub struct MockWallet {
    usdc: u128,
    wei: u128,
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockWallet {
    /// `usdc` in whole units.
    pub fn new(usdc: u64, eth_wei: u128) -> Self {
        Self {
            usdc: u128::from(usdc) * 1_000_000,
            wei: eth_wei,
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn get_balance(&self, _address: &str, token: Token) -> Result<u128> {
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!(msg.clone()));
        }
        Ok(match token {
            Token::Native => self.wei,
            Token::Usdc => self.usdc,
        })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockExecutor {
    failing: HashSet<Protocol>,
    delays: HashMap<Protocol, Duration>,
    submitted: Arc<Mutex<Vec<DepositTask>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits for `protocol` fail with a revert.
    pub fn failing(mut self, protocol: Protocol) -> Self {
        self.failing.insert(protocol);
        self
    }

    /// Deposits for `protocol` take `delay` before answering.
    pub fn delayed(mut self, protocol: Protocol, delay: Duration) -> Self {
        self.delays.insert(protocol, delay);
        self
    }

    pub fn submitted(&self) -> Vec<DepositTask> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DepositExecutor for MockExecutor {
    async fn deposit(&self, task: &DepositTask) -> Result<DepositReceipt> {
        self.submitted.lock().unwrap().push(task.clone());

        if let Some(delay) = self.delays.get(&task.protocol) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&task.protocol) {
            return Err(anyhow!("execution reverted"));
        }

        Ok(DepositReceipt {
            protocol: task.protocol,
            tx_hash: format!("0x{}", Uuid::new_v4().simple()),
            amount: task.amount.clone(),
            submitted_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use yield_allocator::engine::executor::ExecutionOrchestrator;
    use yield_allocator::types::{Allocation, PoolData};

    #[tokio::test]
    async fn test_mock_markets_forced_error() {
        let markets = MockMarkets::new("USDC");
        assert!(markets.fetch(Protocol::Morpho, "USDC").await.is_ok());

        markets.set_error(Protocol::Morpho, "503");
        assert!(markets.fetch(Protocol::Morpho, "USDC").await.is_err());
        assert!(markets.fetch(Protocol::Moonwell, "USDC").await.is_ok());
        assert_eq!(markets.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_wallet_balances() {
        let wallet = MockWallet::new(250, 10);
        assert_eq!(wallet.get_balance(WALLET, Token::Usdc).await.unwrap(), 250_000_000);
        assert_eq!(wallet.get_balance(WALLET, Token::Native).await.unwrap(), 10);
        wallet.set_error("offline");
        assert!(wallet.get_balance(WALLET, Token::Usdc).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_executor_records_tasks() {
        let pool = PoolData {
            protocol: Protocol::Morpho,
            vault_id: "mwUSDC".into(),
            address: "0xc1256Ae5FF1cf2719D4937adb3bbCCab2E00A2Ca".into(),
            supply_apy: 5.0,
            utilization_rate: 20.0,
            available_liquidity: 1e7,
            risk_score: 10.0,
        };
        let task = ExecutionOrchestrator::build_task(&Allocation::from_pool(&pool, 10.0), WALLET)
            .unwrap()
            .unwrap();

        let exec = MockExecutor::new().failing(Protocol::Moonwell);
        let receipt = exec.deposit(&task).await.unwrap();
        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(exec.submitted().len(), 1);
        assert_eq!(exec.submitted()[0].amount, "10.00");
    }
}
