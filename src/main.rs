//! Yield allocator server.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market, wallet and deposit collaborators, and serves the HTTP
//! API until Ctrl+C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use yield_allocator::config::{self, ExecutionMode};
use yield_allocator::engine::executor::{
    DepositExecutor, DryRunExecutor, ExecutionOrchestrator, RelayExecutor,
};
use yield_allocator::engine::pipeline::AllocationPipeline;
use yield_allocator::protocols::moonwell::MoonwellClient;
use yield_allocator::protocols::morpho::MorphoClient;
use yield_allocator::protocols::MarketRouter;
use yield_allocator::server::{self, ServerState};
use yield_allocator::types::is_evm_address;
use yield_allocator::wallet::{RpcWalletProvider, WalletProvider};

const BANNER: &str = r#"
 __   ___     _    _
 \ \ / (_)___| |__| |
  \ V /| / -_) / _` |
   |_| |_\___|_\__,_|

  Risk-adjusted stablecoin allocator
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load_default()?;

    init_logging();

    println!("{BANNER}");
    info!(
        asset = %cfg.allocator.asset,
        chain_id = cfg.allocator.chain_id,
        mode = ?cfg.execution.mode,
        "Allocator starting up"
    );

    // -- Collaborators ---------------------------------------------------

    let markets = MarketRouter::new(
        MoonwellClient::new(&cfg.protocols.moonwell.api_url, cfg.allocator.chain_id)?,
        MorphoClient::new(&cfg.protocols.morpho.api_url, cfg.allocator.chain_id)?,
    );

    let wallet_address = config::AppConfig::resolve_env(&cfg.wallet.address_env)?;
    if !is_evm_address(&wallet_address) {
        anyhow::bail!("{} is not a valid address", cfg.wallet.address_env);
    }
    let rpc_url = config::AppConfig::resolve_secret(&cfg.wallet.rpc_url_env)?;
    let wallet: Arc<dyn WalletProvider> =
        Arc::new(RpcWalletProvider::new(rpc_url, &cfg.wallet.usdc_address)?);

    let executor: Arc<dyn DepositExecutor> = match cfg.execution.mode {
        ExecutionMode::DryRun => {
            warn!("Dry-run mode: deposits are logged, not submitted");
            Arc::new(DryRunExecutor::new())
        }
        ExecutionMode::Live => {
            let relay_url = cfg
                .execution
                .relay_url
                .as_deref()
                .context("execution.relay_url is required in live mode")?;
            let key_env = cfg
                .execution
                .relay_api_key_env
                .as_deref()
                .context("execution.relay_api_key_env is required in live mode")?;
            info!(relay_url, "Live mode: deposits go to the signing relay");
            Arc::new(RelayExecutor::new(
                relay_url,
                config::AppConfig::resolve_secret(key_env)?,
                &cfg.wallet.usdc_address,
            )?)
        }
    };

    let orchestrator = ExecutionOrchestrator::new(
        executor,
        Duration::from_secs(cfg.execution.deposit_timeout_secs),
        &cfg.allocator.asset,
    );

    let pipeline = AllocationPipeline::new(
        Arc::new(markets),
        Arc::clone(&wallet),
        orchestrator,
        &wallet_address,
        &cfg.allocator.asset,
    );

    let state = Arc::new(ServerState {
        pipeline: Arc::new(pipeline),
        wallet,
        stream_capacity: cfg.server.stream_capacity,
    });

    // -- Serve -----------------------------------------------------------

    let addr: SocketAddr = format!("{}:{}", cfg.server.bind, cfg.server.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cfg.server.bind, cfg.server.port))?;

    server::serve(addr, state, shutdown_signal()).await?;

    info!("Allocator shut down cleanly.");
    Ok(())
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("yield_allocator=info"));

    let json_logging = std::env::var("ALLOCATOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
