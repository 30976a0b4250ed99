//! Core engine: the per-request allocate → deposit pipeline.

pub mod executor;
pub mod pipeline;
pub mod progress;

pub use executor::{DepositExecutor, DryRunExecutor, ExecutionOrchestrator, ExecutionReport, RelayExecutor};
pub use pipeline::AllocationPipeline;
pub use progress::{ProgressChannel, ProgressStream};
