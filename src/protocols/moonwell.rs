//! Moonwell lending-market data.
//!
//! Markets are read from a market feed that serves the Moonwell SDK's
//! `Market` serialization (camelCase JSON, one object per market).
//!
//! Endpoint: `GET {api_url}/markets?chainId={chain_id}`
//! Auth: none.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Amount, TokenConfig};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Per-asset reward stream on a Moonwell market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketReward {
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub supply_apr: f64,
    #[serde(default)]
    pub borrow_apr: f64,
}

/// A Moonwell market as served by the feed. Only the fields the allocator
/// reads are required; everything else defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoonwellMarket {
    pub market_key: String,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub mint_paused: bool,
    #[serde(default)]
    pub market_token: TokenConfig,
    #[serde(default)]
    pub underlying_token: TokenConfig,
    /// Loan-to-value for the market. Absent or zero means "use the default".
    #[serde(default)]
    pub collateral_factor: Option<f64>,
    #[serde(default)]
    pub underlying_price: f64,
    #[serde(default)]
    pub total_supply: Amount,
    #[serde(default)]
    pub total_supply_usd: f64,
    #[serde(default)]
    pub total_borrows: Amount,
    #[serde(default)]
    pub total_borrows_usd: f64,
    #[serde(default)]
    pub base_supply_apy: f64,
    #[serde(default)]
    pub base_borrow_apy: f64,
    /// Incentive APR on supply, in percentage points.
    #[serde(default)]
    pub total_supply_apr: f64,
    #[serde(default)]
    pub rewards: Vec<MarketReward>,
}

impl MoonwellMarket {
    #[cfg(test)]
    pub(crate) fn sample() -> Self {
        MoonwellMarket {
            market_key: "MOONWELL_USDC".to_string(),
            chain_id: 8453,
            market_token: TokenConfig {
                address: "0xEdc817A28E8B93B03976FBd4a3dDBc9f7D176c22".to_string(),
                decimals: 8,
                name: "Moonwell USDC".to_string(),
                symbol: "mUSDC".to_string(),
            },
            underlying_token: TokenConfig {
                address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
                decimals: 6,
                name: "USD Coin".to_string(),
                symbol: "USDC".to_string(),
            },
            collateral_factor: Some(0.88),
            underlying_price: 1.0,
            total_supply_usd: 40_000_000.0,
            total_borrows_usd: 30_000_000.0,
            base_supply_apy: 4.0,
            total_supply_apr: 1.5,
            ..MoonwellMarket::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Moonwell market feed client.
pub struct MoonwellClient {
    http: Client,
    api_url: String,
    chain_id: u64,
}

impl MoonwellClient {
    pub fn new(api_url: &str, chain_id: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("yield-allocator/0.1.0")
            .build()
            .context("Failed to build HTTP client for Moonwell")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            chain_id,
        })
    }

    /// Fetch every market on the configured chain.
    pub async fn fetch_markets(&self) -> Result<Vec<MoonwellMarket>> {
        let url = format!("{}/markets?chainId={}", self.api_url, self.chain_id);
        debug!(url = %url, "Fetching Moonwell markets");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Moonwell API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Moonwell API error {status}: {body}");
        }

        let markets: Vec<MoonwellMarket> = resp
            .json()
            .await
            .context("Failed to parse Moonwell markets response")?;

        Ok(markets)
    }

    /// Fetch the first live market whose underlying token is `asset`.
    pub async fn fetch_market(&self, asset: &str) -> Result<MoonwellMarket> {
        let markets = self.fetch_markets().await?;
        info!(count = markets.len(), asset, "Moonwell markets fetched");
        Self::select_market(markets, asset)
            .with_context(|| format!("No {asset} market found for moonwell"))
    }

    /// Pick the first non-deprecated market for `asset`.
    fn select_market(markets: Vec<MoonwellMarket>, asset: &str) -> Option<MoonwellMarket> {
        let mut candidates = markets
            .into_iter()
            .filter(|m| m.underlying_token.is_symbol(asset));

        let first = candidates.next()?;
        if !first.deprecated {
            return Some(first);
        }
        warn!(key = %first.market_key, "Skipping deprecated Moonwell market");
        candidates.find(|m| !m.deprecated)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn market(key: &str, symbol: &str, deprecated: bool) -> MoonwellMarket {
        MoonwellMarket {
            market_key: key.to_string(),
            deprecated,
            underlying_token: TokenConfig {
                symbol: symbol.to_string(),
                ..TokenConfig::default()
            },
            ..MoonwellMarket::default()
        }
    }

    #[test]
    fn test_select_market_by_symbol() {
        let markets = vec![
            market("MOONWELL_WETH", "WETH", false),
            market("MOONWELL_USDC", "USDC", false),
        ];
        let m = MoonwellClient::select_market(markets, "usdc").unwrap();
        assert_eq!(m.market_key, "MOONWELL_USDC");
    }

    #[test]
    fn test_select_market_skips_deprecated() {
        let markets = vec![
            market("MOONWELL_USDC_OLD", "USDC", true),
            market("MOONWELL_USDC", "USDC", false),
        ];
        let m = MoonwellClient::select_market(markets, "USDC").unwrap();
        assert_eq!(m.market_key, "MOONWELL_USDC");
    }

    #[test]
    fn test_select_market_none() {
        let markets = vec![market("MOONWELL_WETH", "WETH", false)];
        assert!(MoonwellClient::select_market(markets, "USDC").is_none());
    }

    #[test]
    fn test_deserialize_sdk_shape() {
        let json = r#"{
            "marketKey": "MOONWELL_USDC",
            "chainId": 8453,
            "deprecated": false,
            "marketToken": {"address": "0xEdc817A28E8B93B03976FBd4a3dDBc9f7D176c22", "decimals": 8, "name": "Moonwell USDC", "symbol": "mUSDC"},
            "underlyingToken": {"address": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "decimals": 6, "name": "USD Coin", "symbol": "USDC"},
            "collateralFactor": 0.88,
            "totalSupply": {"_className": "Amount", "value": 41000000.5, "exponential": "41000000500000", "base": 6},
            "totalSupplyUsd": 41000000.5,
            "totalBorrowsUsd": 32000000.0,
            "baseSupplyApy": 4.12,
            "totalSupplyApr": 1.3,
            "rewards": []
        }"#;
        let m: MoonwellMarket = serde_json::from_str(json).unwrap();
        assert_eq!(m.market_key, "MOONWELL_USDC");
        assert_eq!(m.collateral_factor, Some(0.88));
        assert!((m.total_supply.value - 41_000_000.5).abs() < 1e-6);
        assert!((m.total_borrows.value - 0.0).abs() < 1e-12);
        assert!(m.underlying_token.is_symbol("USDC"));
    }

    #[test]
    fn test_new_client_trims_url() {
        let client = MoonwellClient::new("http://localhost:8788/moonwell/", 8453).unwrap();
        assert_eq!(client.api_url, "http://localhost:8788/moonwell");
    }
}
