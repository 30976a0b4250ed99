//! Morpho vault data via the Morpho GraphQL API.
//!
//! API: https://blue-api.morpho.org/graphql
//! Auth: none for reads.
//!
//! The API reports APYs as fractions and token quantities as base-unit
//! integers; both are converted here into the `MorphoVault` record shape
//! (percentage points, whole-unit floats) the normalizer expects.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Amount, TokenConfig};

const VAULTS_QUERY: &str = r#"
query Vaults($chainId: Int!) {
  vaults(first: 200, where: { chainId_in: [$chainId], whitelisted: true }) {
    items {
      address
      name
      symbol
      asset { address symbol name decimals }
      state { totalAssets totalAssetsUsd totalSupply apy netApy fee curators { name } }
      liquidity { underlying usd }
    }
  }
}
"#;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A Morpho vault in the shape the allocator consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphoVault {
    pub vault_key: String,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub vault_token: TokenConfig,
    #[serde(default)]
    pub underlying_token: TokenConfig,
    /// Assets supplied into the vault.
    #[serde(default)]
    pub total_supply: Amount,
    #[serde(default)]
    pub total_supply_usd: f64,
    /// Assets withdrawable right now.
    #[serde(default)]
    pub total_liquidity: Amount,
    #[serde(default)]
    pub total_liquidity_usd: f64,
    #[serde(default)]
    pub base_apy: f64,
    #[serde(default)]
    pub rewards_apy: f64,
    /// Net APY in percentage points (base + rewards − fee).
    #[serde(default)]
    pub total_apy: f64,
    #[serde(default)]
    pub performance_fee: f64,
    #[serde(default)]
    pub curators: Vec<String>,
}

impl MorphoVault {
    #[cfg(test)]
    pub(crate) fn sample(underlying: &str) -> Self {
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
                address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string(),
                decimals: 6,
                name: "USD Coin".to_string(),
                symbol: underlying.to_string(),
            },
            total_supply: Amount::from_value(20_000_000.0, 6),
            total_supply_usd: 20_000_000.0,
            total_liquidity: Amount::from_value(25_000_000.0, 6),
            total_liquidity_usd: 25_000_000.0,
            base_apy: 5.0,
            rewards_apy: 1.0,
            total_apy: 6.0,
            ..MorphoVault::default()
        }
    }
}

// ---------------------------------------------------------------------------
// API response types (GraphQL JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<VaultsData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct VaultsData {
    vaults: VaultPage,
}

#[derive(Debug, Deserialize)]
struct VaultPage {
    #[serde(default)]
    items: Vec<ApiVault>,
}

#[derive(Debug, Deserialize)]
struct ApiVault {
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    asset: ApiAsset,
    #[serde(default)]
    state: Option<ApiVaultState>,
    #[serde(default)]
    liquidity: Option<ApiLiquidity>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    decimals: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVaultState {
    /// BigInt scalar: number or string depending on size.
    #[serde(default)]
    total_assets: Value,
    #[serde(default)]
    total_assets_usd: Option<f64>,
    #[serde(default)]
    apy: Option<f64>,
    #[serde(default)]
    net_apy: Option<f64>,
    #[serde(default)]
    fee: Option<f64>,
    #[serde(default)]
    curators: Vec<ApiCurator>,
}

#[derive(Debug, Deserialize)]
struct ApiCurator {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiLiquidity {
    #[serde(default)]
    underlying: Value,
    #[serde(default)]
    usd: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Morpho GraphQL client.
pub struct MorphoClient {
    http: Client,
    api_url: String,
    chain_id: u64,
}

impl MorphoClient {
    pub fn new(api_url: &str, chain_id: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("yield-allocator/0.1.0")
            .build()
            .context("Failed to build HTTP client for Morpho")?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            chain_id,
        })
    }

    /// Fetch all whitelisted vaults on the configured chain.
    pub async fn fetch_vaults(&self) -> Result<Vec<MorphoVault>> {
        debug!(url = %self.api_url, chain_id = self.chain_id, "Fetching Morpho vaults");

        let body = json!({
            "query": VAULTS_QUERY,
            "variables": { "chainId": self.chain_id },
        });

        let resp = self
            .http
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .context("Morpho API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Morpho API error {status}: {body}");
        }

        let parsed: GraphQlResponse = resp
            .json()
            .await
            .context("Failed to parse Morpho vaults response")?;

        let vaults = Self::extract_vaults(parsed, self.chain_id)?;
        info!(count = vaults.len(), "Morpho vaults fetched");
        Ok(vaults)
    }

    /// Fetch the first vault whose share token or underlying token is `asset`.
    pub async fn fetch_vault(&self, asset: &str) -> Result<MorphoVault> {
        let vaults = self.fetch_vaults().await?;
        Self::select_vault(vaults, asset)
            .with_context(|| format!("No {asset} vault found for morpho"))
    }

    fn select_vault(vaults: Vec<MorphoVault>, asset: &str) -> Option<MorphoVault> {
        vaults
            .into_iter()
            .find(|v| v.vault_token.is_symbol(asset) || v.underlying_token.is_symbol(asset))
    }

    fn extract_vaults(resp: GraphQlResponse, chain_id: u64) -> Result<Vec<MorphoVault>> {
        if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            anyhow::bail!("Morpho API returned errors: {}", messages.join("; "));
        }

        let data = resp.data.context("Morpho API response has no data")?;
        Ok(data
            .vaults
            .items
            .into_iter()
            .map(|v| Self::to_vault(v, chain_id))
            .collect())
    }

    /// Convert an API vault into a `MorphoVault` record.
    fn to_vault(v: ApiVault, chain_id: u64) -> MorphoVault {
        let decimals = v.asset.decimals;
        let scale = 10f64.powi(decimals as i32);
        let state = v.state;
        let liquidity = v.liquidity;

        let total_assets = state
            .as_ref()
            .map(|s| json_number(&s.total_assets) / scale)
            .unwrap_or(0.0);
        let total_liquidity = liquidity
            .as_ref()
            .map(|l| json_number(&l.underlying) / scale)
            .unwrap_or(0.0);

        let base_apy = state.as_ref().and_then(|s| s.apy).unwrap_or(0.0) * 100.0;
        let net_apy = state
            .as_ref()
            .and_then(|s| s.net_apy)
            .map(|a| a * 100.0)
            .unwrap_or(base_apy);

        MorphoVault {
            vault_key: if v.symbol.is_empty() { v.address.clone() } else { v.symbol.clone() },
            chain_id,
            vault_token: TokenConfig {
                address: v.address,
                decimals: 18,
                name: v.name,
                symbol: v.symbol,
            },
            underlying_token: TokenConfig {
                address: v.asset.address,
                decimals,
                name: v.asset.name,
                symbol: v.asset.symbol,
            },
            total_supply: Amount::from_value(total_assets, decimals),
            total_supply_usd: state.as_ref().and_then(|s| s.total_assets_usd).unwrap_or(0.0),
            total_liquidity: Amount::from_value(total_liquidity, decimals),
            total_liquidity_usd: liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0),
            base_apy,
            rewards_apy: (net_apy - base_apy).max(0.0),
            total_apy: net_apy,
            performance_fee: state.as_ref().and_then(|s| s.fee).unwrap_or(0.0),
            curators: state
                .map(|s| s.curators.into_iter().map(|c| c.name).collect())
                .unwrap_or_default(),
        }
    }
}

/// Read a GraphQL BigInt/Float that may arrive as a number or a string.
fn json_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
