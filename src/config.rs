//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path in `ALLOCATOR_CONFIG`) and deserializes
//! into strongly-typed structs. Secrets (relay key, RPC URL, wallet address)
//! are referenced by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::types::is_evm_address;

/// Env var overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "ALLOCATOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub allocator: AllocatorConfig,
    pub execution: ExecutionConfig,
    pub protocols: ProtocolsConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub port: u16,
    /// Progress lines buffered per request before producers wait.
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AllocatorConfig {
    /// Symbol of the asset being allocated.
    pub asset: String,
    pub chain_id: u64,
}

/// How deposits are submitted.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Log and return synthetic receipts.
    DryRun,
    /// Forward to the signing relay.
    Live,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub deposit_timeout_secs: u64,
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default)]
    pub relay_api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolsConfig {
    pub moonwell: ProtocolEndpoint,
    pub morpho: ProtocolEndpoint,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolEndpoint {
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    /// Env var holding the account address.
    pub address_env: String,
    /// Env var holding the JSON-RPC endpoint.
    pub rpc_url_env: String,
    pub usdc_address: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_stream_capacity() -> usize {
    64
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from `ALLOCATOR_CONFIG`, falling back to `config.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load(&path)
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, mid-request.
    pub fn validate(&self) -> Result<()> {
        if self.allocator.asset.trim().is_empty() {
            anyhow::bail!("allocator.asset must not be empty");
        }
        if self.execution.deposit_timeout_secs == 0 {
            anyhow::bail!("execution.deposit_timeout_secs must be greater than zero");
        }
        if self.server.stream_capacity == 0 {
            anyhow::bail!("server.stream_capacity must be greater than zero");
        }
        if !is_evm_address(&self.wallet.usdc_address) {
            anyhow::bail!("wallet.usdc_address is not a valid address: {}", self.wallet.usdc_address);
        }
        if self.execution.mode == ExecutionMode::Live {
            if self.execution.relay_url.is_none() {
                anyhow::bail!("execution.relay_url is required in live mode");
            }
            if self.execution.relay_api_key_env.is_none() {
                anyhow::bail!("execution.relay_api_key_env is required in live mode");
            }
        }
        for (name, endpoint) in [
            ("moonwell", &self.protocols.moonwell),
            ("morpho", &self.protocols.morpho),
        ] {
            if !endpoint.api_url.starts_with("http") {
                anyhow::bail!("protocols.{name}.api_url must be an http(s) URL");
            }
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an environment variable into a secret.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
