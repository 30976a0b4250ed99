//! Market normalization.
//!
//! Turns raw provider records into `PoolData`. Lending markets derive risk
//! from utilization and loan-to-value; curated vaults get a fixed score.

use tracing::{debug, warn};

use crate::protocols::moonwell::MoonwellMarket;
use crate::protocols::morpho::MorphoVault;
use crate::protocols::MarketRecord;
use crate::types::{AllocatorError, PoolData, Protocol};

/// Loan-to-value assumed when a market doesn't report one.
pub const DEFAULT_LOAN_TO_VALUE: f64 = 0.8;
/// Utilization above this (percent) reduces the risk score.
pub const UTILIZATION_PENALTY_START: f64 = 80.0;
/// Risk score given to curated vaults.
pub const CURATED_VAULT_RISK: f64 = 10.0;

/// Pools ready for allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketSnapshot {
    /// Every protocol's pool, primary first.
    Pools(Vec<PoolData>),
    /// A secondary record was for the wrong asset; only the primary is usable.
    SingleProtocol { pool: PoolData, skipped: Protocol },
}

impl MarketSnapshot {
    pub fn pools(&self) -> Vec<&PoolData> {
        match self {
            MarketSnapshot::Pools(pools) => pools.iter().collect(),
            MarketSnapshot::SingleProtocol { pool, .. } => vec![pool],
        }
    }
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// `borrows / supply × 100`, or 0 when nothing is supplied.
pub fn utilization_rate(total_borrows: f64, total_supply: f64) -> f64 {
    if total_supply == 0.0 {
        return 0.0;
    }
    (total_borrows / total_supply) * 100.0
}

/// `max(0, supply − borrows)`.
pub fn available_liquidity(total_supply_usd: f64, total_borrows_usd: f64) -> f64 {
    (total_supply_usd - total_borrows_usd).max(0.0)
}

/// `10 − utilization penalty − LTV penalty`; higher is safer.
pub fn risk_score(utilization: f64, loan_to_value: f64) -> f64 {
    let utilization_penalty = (utilization - UTILIZATION_PENALTY_START).max(0.0) * 0.1;
    let ltv_penalty = (loan_to_value - DEFAULT_LOAN_TO_VALUE).max(0.0) * 10.0;
    10.0 - utilization_penalty - ltv_penalty
}

/// Replace NaN/inf provider values with 0.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Per-protocol conversion
// ---------------------------------------------------------------------------

/// Lending-market style: utilization and liquidity from supply/borrow USD.
pub fn moonwell_pool(m: &MoonwellMarket) -> PoolData {
    let supply_usd = finite_or_zero(m.total_supply_usd);
    let borrows_usd = finite_or_zero(m.total_borrows_usd);
    let utilization = utilization_rate(borrows_usd, supply_usd);
    let ltv = m
        .collateral_factor
        .filter(|cf| cf.is_finite() && *cf != 0.0)
        .unwrap_or(DEFAULT_LOAN_TO_VALUE);

    PoolData {
        protocol: Protocol::Moonwell,
        vault_id: m.market_key.clone(),
        address: m.market_token.address.clone(),
        supply_apy: finite_or_zero(m.base_supply_apy) + finite_or_zero(m.total_supply_apr),
        utilization_rate: utilization,
        available_liquidity: available_liquidity(supply_usd, borrows_usd),
        risk_score: risk_score(utilization, ltv),
    }
}

/// Curated-vault style: provider-reported liquidity, fixed risk.
///
/// Utilization is the vault's supplied assets over its withdrawable
/// liquidity, so it exceeds 100 whenever most assets are lent out.
pub fn morpho_pool(v: &MorphoVault) -> PoolData {
    PoolData {
        protocol: Protocol::Morpho,
        vault_id: v.vault_key.clone(),
        address: v.vault_token.address.clone(),
        supply_apy: finite_or_zero(v.total_apy),
        utilization_rate: utilization_rate(
            finite_or_zero(v.total_supply.value),
            finite_or_zero(v.total_liquidity.value),
        ),
        available_liquidity: finite_or_zero(v.total_liquidity_usd).max(0.0),
        risk_score: CURATED_VAULT_RISK,
    }
}

/// Convert any record into `PoolData`.
pub fn to_pool(record: &MarketRecord) -> PoolData {
    match record {
        MarketRecord::Moonwell(m) => moonwell_pool(m),
        MarketRecord::Morpho(v) => morpho_pool(v),
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Normalize the primary record plus any secondaries for `asset`.
///
/// The primary must be for `asset`. The first secondary whose underlying
/// token is not `asset` collapses the snapshot to the primary alone.
pub fn normalize(
    primary: &MarketRecord,
    secondaries: &[MarketRecord],
    asset: &str,
) -> Result<MarketSnapshot, AllocatorError> {
    if !primary.underlying().is_symbol(asset) {
        return Err(AllocatorError::MarketUnavailable {
            protocol: primary.protocol(),
            reason: format!(
                "market {} is for {}, not {asset}",
                primary.key(),
                primary.underlying().symbol
            ),
        });
    }

    let primary_pool = to_pool(primary);
    let mut pools = vec![primary_pool.clone()];

    for record in secondaries {
        if !record.underlying().is_symbol(asset) {
            warn!(
                protocol = record.protocol().as_str(),
                key = record.key(),
                underlying = %record.underlying().symbol,
                asset,
                "Secondary market is for a different asset, falling back to single protocol"
            );
            return Ok(MarketSnapshot::SingleProtocol {
                pool: primary_pool,
                skipped: record.protocol(),
            });
        }
        pools.push(to_pool(record));
    }

    for pool in &pools {
        debug!(
            protocol = pool.protocol.as_str(),
            apy = pool.supply_apy,
            utilization = pool.utilization_rate,
            liquidity = pool.available_liquidity,
            risk = pool.risk_score,
            "Pool normalized"
        );
    }

    Ok(MarketSnapshot::Pools(pools))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
