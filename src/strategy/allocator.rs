//! Score-proportional allocation.
//!
//! Splits a requested amount across pools in proportion to their scores,
//! caps each share at the pool's available liquidity, then rescales so the
//! shares add back up to the requested amount. Rescaling can push a share
//! back above its cap when another pool's cap binds; that is intended.
//!
//! Degenerate inputs fall back to an even split. No rounding happens here.

use tracing::{debug, info};

use super::normalizer::MarketSnapshot;
use super::score::score;
use crate::engine::progress::ProgressChannel;
use crate::types::{Allocation, AllocationResult, AllocatorError, PoolData, Protocol};

/// How the split was decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// The secondary market was for another asset; everything to the primary.
    SingleProtocol { skipped: Protocol },
    /// Proportional to score, liquidity-capped and renormalized.
    ScoreWeighted { scores: Vec<(Protocol, f64)> },
    /// Scores (or capped shares) summed to zero or less.
    EvenSplit { scores: Vec<(Protocol, f64)> },
}

/// Allocation plus the reasoning behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub result: AllocationResult,
    pub strategy: Strategy,
}

/// Turns a market snapshot into an allocation, narrating each stage.
pub struct Allocator {
    asset: String,
}

impl Allocator {
    pub fn new(asset: &str) -> Self {
        Self {
            asset: asset.to_string(),
        }
    }

    /// Compute the split without emitting progress.
    pub fn plan(&self, amount: f64, snapshot: &MarketSnapshot) -> AllocationPlan {
        let pools = match snapshot {
            MarketSnapshot::SingleProtocol { pool, skipped } => {
                return AllocationPlan {
                    result: AllocationResult {
                        total: amount,
                        allocations: vec![Allocation::from_pool(pool, amount)],
                    },
                    strategy: Strategy::SingleProtocol { skipped: *skipped },
                };
            }
            MarketSnapshot::Pools(pools) => pools,
        };

        let scores: Vec<(Protocol, f64)> = pools.iter().map(|p| (p.protocol, score(p))).collect();
        let total_score: f64 = scores.iter().map(|(_, s)| s).sum();

        if total_score > 0.0 {
            // Pools with a non-positive score get nothing.
            let capped: Vec<(&PoolData, f64)> = pools
                .iter()
                .zip(&scores)
                .filter(|(_, (_, s))| *s > 0.0)
                .map(|(pool, (_, s))| {
                    let raw = amount * s / total_score;
                    (pool, raw.min(pool.available_liquidity))
                })
                .collect();

            let total_allocated: f64 = capped.iter().map(|(_, a)| a).sum();
            if total_allocated > 0.0 {
                let scale = if total_allocated != amount {
                    amount / total_allocated
                } else {
                    1.0
                };
                debug!(total_score, total_allocated, scale, "Renormalizing capped shares");

                let allocations = capped
                    .into_iter()
                    .map(|(pool, a)| Allocation::from_pool(pool, a * scale))
                    .collect();

                return AllocationPlan {
                    result: AllocationResult {
                        total: amount,
                        allocations,
                    },
                    strategy: Strategy::ScoreWeighted { scores },
                };
            }
        }

        let share = amount / pools.len().max(1) as f64;
        AllocationPlan {
            result: AllocationResult {
                total: amount,
                allocations: pools.iter().map(|p| Allocation::from_pool(p, share)).collect(),
            },
            strategy: Strategy::EvenSplit { scores },
        }
    }

    /// Compute the split and narrate it on `progress`.
    pub async fn allocate(
        &self,
        amount: f64,
        snapshot: &MarketSnapshot,
        progress: &ProgressChannel,
    ) -> Result<AllocationResult, AllocatorError> {
        progress.log("Analyzing market conditions...").await?;

        let plan = self.plan(amount, snapshot);

        match &plan.strategy {
            Strategy::SingleProtocol { skipped } => {
                progress
                    .log(format!(
                        "Skipping {skipped} vault as it's not a {} vault",
                        self.asset
                    ))
                    .await?;
            }
            Strategy::ScoreWeighted { scores } => {
                progress.log(Self::market_analysis(snapshot)).await?;
                progress
                    .log(format!(
                        "Allocation Strategy (Score-based: {}):\n{}",
                        Self::score_comparison(scores),
                        self.breakdown(&plan.result)
                    ))
                    .await?;
            }
            Strategy::EvenSplit { scores } => {
                progress.log(Self::market_analysis(snapshot)).await?;
                let n = plan.result.allocations.len().max(1);
                let pct = format!("{:.0}", 100.0 / n as f64);
                progress
                    .log(format!(
                        "Using default {} allocation strategy (scores: {})",
                        vec![pct; n].join("-"),
                        Self::score_comparison(scores)
                    ))
                    .await?;
            }
        }

        info!(
            amount,
            allocations = plan.result.allocations.len(),
            strategy = ?plan.strategy,
            "Allocation computed"
        );

        Ok(plan.result)
    }

    fn market_analysis(snapshot: &MarketSnapshot) -> String {
        let rows: Vec<String> = snapshot.pools().iter().map(|p| p.to_string()).collect();
        format!("Market Analysis:\n{}", rows.join("\n"))
    }

    fn score_comparison(scores: &[(Protocol, f64)]) -> String {
        scores
            .iter()
            .map(|(p, s)| format!("{p} {s:.1}"))
            .collect::<Vec<_>>()
            .join(" vs ")
    }

    fn breakdown(&self, result: &AllocationResult) -> String {
        result
            .allocations
            .iter()
            .map(|a| {
                let pct = if result.total > 0.0 {
                    a.amount / result.total * 100.0
                } else {
                    0.0
                };
                format!("{}: {pct:.1}% ({:.6} {})", a.protocol.as_str(), a.amount, self.asset)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
