//! Strategy engine: normalization, scoring, allocation and amount precision.
//!
//! Data flows `MarketRecord` → `normalizer` → `PoolData` → `score` →
//! `allocator` → `AllocationResult`. `precision` converts allocator output
//! into the fixed-decimal strings deposit executors accept.

pub mod allocator;
pub mod normalizer;
pub mod precision;
pub mod score;

pub use allocator::{AllocationPlan, Allocator, Strategy};
pub use normalizer::{normalize, MarketSnapshot};
pub use precision::{to_base_units, to_whole_units};
pub use score::score;
