//! Lending protocol integrations.
//!
//! Defines the `MarketDataProvider` trait and the raw record types it
//! returns, plus implementations for:
//! - Moonwell: lending markets (supply/borrow pools)
//! - Morpho: curated ERC-4626 vaults
//!
//! `MarketRouter` dispatches on `Protocol` to the matching client.

pub mod moonwell;
pub mod morpho;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::Protocol;
use moonwell::{MoonwellClient, MoonwellMarket};
use morpho::{MorphoClient, MorphoVault};

// ---------------------------------------------------------------------------
// Shared record types
// ---------------------------------------------------------------------------

/// ERC-20 token metadata as reported by the providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
}

impl TokenConfig {
    /// Case-insensitive symbol comparison.
    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol.trim())
    }
}

/// A token quantity as the providers serialize it: a float `value` plus the
/// base-unit integer as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub exponential: Option<String>,
    #[serde(default)]
    pub base: u32,
}

impl Amount {
    pub fn from_value(value: f64, base: u32) -> Self {
        Self {
            value,
            exponential: None,
            base,
        }
    }
}

/// One raw provider record, tagged by protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketRecord {
    Moonwell(MoonwellMarket),
    Morpho(MorphoVault),
}

impl MarketRecord {
    pub fn protocol(&self) -> Protocol {
        match self {
            MarketRecord::Moonwell(_) => Protocol::Moonwell,
            MarketRecord::Morpho(_) => Protocol::Morpho,
        }
    }

    /// Provider key of the market or vault.
    pub fn key(&self) -> &str {
        match self {
            MarketRecord::Moonwell(m) => &m.market_key,
            MarketRecord::Morpho(v) => &v.vault_key,
        }
    }

    pub fn underlying(&self) -> &TokenConfig {
        match self {
            MarketRecord::Moonwell(m) => &m.underlying_token,
            MarketRecord::Morpho(v) => &v.underlying_token,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Abstraction over market data sources.
///
/// Implementors return the first record for `protocol` that matches `asset`.
/// A record whose underlying token differs from `asset` may still be
/// returned (e.g. a vault matched by its share-token symbol); the normalizer
/// decides what to do with it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, protocol: Protocol, asset: &str) -> Result<MarketRecord>;
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes market-data requests to the per-protocol clients.
pub struct MarketRouter {
    moonwell: MoonwellClient,
    morpho: MorphoClient,
}

impl MarketRouter {
    pub fn new(moonwell: MoonwellClient, morpho: MorphoClient) -> Self {
        Self { moonwell, morpho }
    }
}

#[async_trait]
impl MarketDataProvider for MarketRouter {
    async fn fetch(&self, protocol: Protocol, asset: &str) -> Result<MarketRecord> {
        debug!(protocol = protocol.as_str(), asset, "Fetching market record");

        let record = match protocol {
            Protocol::Moonwell => MarketRecord::Moonwell(self.moonwell.fetch_market(asset).await?),
            Protocol::Morpho => MarketRecord::Morpho(self.morpho.fetch_vault(asset).await?),
        };

        info!(
            protocol = protocol.as_str(),
            key = record.key(),
            underlying = %record.underlying().symbol,
            "Market record fetched"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
