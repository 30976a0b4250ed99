//! Market scoring.
//!
//! Collapses yield, safety and headroom into one comparable number:
//!
//! `score = supply_apy × 0.5 + risk_score × 0.3 + (100 − utilization) × 0.002`

use crate::types::PoolData;

/// Weight on supply APY (percentage points).
pub const APY_WEIGHT: f64 = 0.5;
/// Weight on the 0–10 risk score.
pub const RISK_WEIGHT: f64 = 0.3;
/// Weight on unused capacity (100 − utilization).
pub const HEADROOM_WEIGHT: f64 = 0.002;

/// Score a single pool. Deterministic for identical inputs.
pub fn score(pool: &PoolData) -> f64 {
    pool.supply_apy * APY_WEIGHT
        + pool.risk_score * RISK_WEIGHT
        + (100.0 - pool.utilization_rate) * HEADROOM_WEIGHT
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
