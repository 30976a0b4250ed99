//! Wallet balances.
//!
//! `WalletProvider` reads native and stablecoin balances for an address.
//! `RpcWalletProvider` does it with two JSON-RPC calls against any
//! EVM node: `eth_getBalance` and an `eth_call` to the token's `balanceOf`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::types::{is_evm_address, WalletInfo};

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "0x70a08231";

const WEI_PER_ETH: f64 = 1e18;

/// Which balance to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Chain-native ETH, in wei.
    Native,
    /// The configured stablecoin, in 6-decimal base units.
    Usdc,
}

/// Balance source for the configured account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Balance of `token` held by `address`, in the token's base units.
    async fn get_balance(&self, address: &str, token: Token) -> Result<u128>;
}

// ---------------------------------------------------------------------------
// JSON-RPC provider
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct RpcWalletProvider {
    http: Client,
    rpc_url: SecretString,
    usdc_address: String,
}

impl RpcWalletProvider {
    /// `rpc_url` often embeds an API key, so it is kept secret.
    pub fn new(rpc_url: SecretString, usdc_address: &str) -> Result<Self> {
        if !is_evm_address(usdc_address) {
            anyhow::bail!("Invalid token address: {usdc_address}");
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("yield-allocator/0.1.0")
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http,
            rpc_url,
            usdc_address: usdc_address.to_string(),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "JSON-RPC call");

        let resp = self
            .http
            .post(self.rpc_url.expose_secret())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("RPC error {status}: {body}");
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {method} response"))?;

        if let Some(err) = parsed.error {
            anyhow::bail!("{method} failed ({}): {}", err.code, err.message);
        }
        parsed
            .result
            .with_context(|| format!("{method} returned no result"))
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn get_balance(&self, address: &str, token: Token) -> Result<u128> {
        if !is_evm_address(address) {
            anyhow::bail!("Invalid wallet address: {address}");
        }
        let raw = match token {
            Token::Native => self.call("eth_getBalance", json!([address, "latest"])).await?,
            Token::Usdc => {
                let call = json!({
                    "to": self.usdc_address,
                    "data": balance_of_calldata(address)?,
                });
                self.call("eth_call", json!([call, "latest"])).await?
            }
        };
        parse_hex_quantity(&raw)
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// ABI-encode `balanceOf(address)`.
pub fn balance_of_calldata(address: &str) -> Result<String> {
    if !is_evm_address(address) {
        anyhow::bail!("Invalid address: {address}");
    }
    Ok(format!(
        "{BALANCE_OF_SELECTOR}{:0>64}",
        address[2..].to_ascii_lowercase()
    ))
}

/// Parse a `0x`-prefixed hex quantity or 32-byte word.
pub fn parse_hex_quantity(raw: &str) -> Result<u128> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .with_context(|| format!("Not a hex quantity: {raw}"))?;
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: {raw}"))
}

/// Both balances for `address`.
pub async fn wallet_info(provider: &dyn WalletProvider, address: &str) -> Result<WalletInfo> {
    let (wei, usdc) = tokio::try_join!(
        provider.get_balance(address, Token::Native),
        provider.get_balance(address, Token::Usdc),
    )?;

    Ok(WalletInfo {
        address: address.to_string(),
        usdc_balance: u64::try_from(usdc).context("USDC balance exceeds u64")?,
        eth_balance: wei as f64 / WEI_PER_ETH,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
