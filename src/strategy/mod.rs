//! Strategy orchestration core.
//!
//! Contains the moving parts of the capital orchestration layer:
//! - Performance tracking and score computation
//! - Capital allocation across competing strategies
//! - Timer-driven execution scheduling with failure isolation
//! - The orchestrator facade tying it all together

mod allocator;
mod handle;
pub mod mock;
mod orchestrator;
mod performance;
mod scheduler;

pub use allocator::{AllocationPlan, CapitalAllocator};
pub use handle::{ExecutionResult, StrategyHandle, StrategyStatsSnapshot};
pub use orchestrator::{Orchestrator, OrchestratorStats};
pub use performance::{
    ExecutionRecord, ExecutionState, PerformanceTracker, SkipReason, StrategyPerformance,
};
pub use scheduler::ExecutionScheduler;
